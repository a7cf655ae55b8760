//! Speech Provider Client
//!
//! STT, TTS, and translation behind a `SpeechClient` trait so the handlers
//! and the TTS pipeline stay testable. `HttpSpeechClient` talks to a
//! Sarvam-style REST API: multipart speech-to-text with language detection,
//! JSON text-to-speech returning base64 audio chunks, and a translation
//! endpoint with a per-request length limit that long responses are split
//! across at word boundaries.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::{Bytes, BytesMut};
use reqwest::multipart;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

/// The language the chat model answers in; responses in any other detected
/// language are produced by translating from this one.
pub const DEFAULT_LANGUAGE: &str = "en-IN";

const STT_MODEL: &str = "saaras:v2.5";
const TTS_MODEL: &str = "bulbul:v2";
const TTS_SPEAKER: &str = "anushka";
const TRANSLATE_MODEL: &str = "sarvam-translate:v1";
const TRANSLATE_CHUNK_MAX: usize = 2000;

/// The text and detected language of a transcribed utterance.
#[derive(Debug, Clone)]
pub struct Transcript {
    pub text: String,
    pub language_code: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechClient: Send + Sync {
    /// Transcribes raw audio and detects its spoken language.
    async fn transcribe(&self, audio: Bytes) -> Result<Transcript>;

    /// Synthesizes one piece of text into a complete audio clip.
    async fn synthesize(&self, text: &str, language_code: &str) -> Result<Bytes>;

    /// Translates text between two language codes.
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String>;
}

/// Splits text into pieces of at most `max_length` bytes, preferring word
/// boundaries, for APIs with a per-request length cap.
pub fn chunk_text(text: &str, max_length: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest = text;
    while rest.len() > max_length {
        let mut end = max_length;
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        let mut split = rest[..end].rfind(' ').unwrap_or(end);
        if split == 0 {
            split = end;
        }
        let piece = rest[..split].trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }
        rest = rest[split..].trim_start();
    }
    let tail = rest.trim();
    if !tail.is_empty() {
        chunks.push(tail.to_string());
    }
    chunks
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    transcript: String,
    #[serde(default)]
    language_code: Option<String>,
}

#[derive(Deserialize)]
struct SynthesisResponse {
    audios: Vec<String>,
}

#[derive(Deserialize)]
struct TranslationResponse {
    translated_text: String,
}

/// `SpeechClient` over the provider's REST API.
pub struct HttpSpeechClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpSpeechClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

#[async_trait]
impl SpeechClient for HttpSpeechClient {
    async fn transcribe(&self, audio: Bytes) -> Result<Transcript> {
        let file = multipart::Part::bytes(audio.to_vec())
            .file_name("input.wav")
            .mime_str("audio/wav")?;
        let form = multipart::Form::new()
            .part("file", file)
            .text("model", STT_MODEL);

        let response: TranscriptionResponse = self
            .http
            .post(self.url("speech-to-text-translate"))
            .header("api-subscription-key", &self.api_key)
            .multipart(form)
            .send()
            .await
            .context("Speech-to-text request failed")?
            .error_for_status()
            .context("Speech-to-text request was rejected")?
            .json()
            .await
            .context("Speech-to-text response did not parse")?;

        Ok(Transcript {
            text: response.transcript,
            language_code: response
                .language_code
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
        })
    }

    async fn synthesize(&self, text: &str, language_code: &str) -> Result<Bytes> {
        let response: SynthesisResponse = self
            .http
            .post(self.url("text-to-speech"))
            .header("api-subscription-key", &self.api_key)
            .json(&json!({
                "text": text,
                "target_language_code": language_code,
                "speaker": TTS_SPEAKER,
                "model": TTS_MODEL,
            }))
            .send()
            .await
            .context("Text-to-speech request failed")?
            .error_for_status()
            .context("Text-to-speech request was rejected")?
            .json()
            .await
            .context("Text-to-speech response did not parse")?;

        let mut audio = BytesMut::new();
        for encoded in &response.audios {
            let chunk = BASE64
                .decode(encoded)
                .context("Text-to-speech audio chunk was not valid base64")?;
            audio.extend_from_slice(&chunk);
        }
        Ok(audio.freeze())
    }

    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String> {
        let pieces = chunk_text(text, TRANSLATE_CHUNK_MAX);
        debug!(pieces = pieces.len(), source, target, "translating response");
        let mut translated = Vec::with_capacity(pieces.len());
        for piece in pieces {
            let response: TranslationResponse = self
                .http
                .post(self.url("translate"))
                .header("api-subscription-key", &self.api_key)
                .json(&json!({
                    "input": piece,
                    "source_language_code": source,
                    "target_language_code": target,
                    "speaker_gender": "Female",
                    "mode": "formal",
                    "model": TRANSLATE_MODEL,
                    "enable_preprocessing": false,
                }))
                .send()
                .await
                .context("Translation request failed")?
                .error_for_status()
                .context("Translation request was rejected")?
                .json()
                .await
                .context("Translation response did not parse")?;
            translated.push(response.translated_text);
        }
        Ok(translated.join(" "))
    }
}
