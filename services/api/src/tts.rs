//! Sentence-Pipelined Speech Synthesis
//!
//! Long replies are split into sentences so the first clip can be synthesized
//! and streamed while later sentences are still in flight. The split is a
//! latency optimization, not a correctness requirement: a reply with no
//! sentence terminators is synthesized whole.

use crate::speech::SpeechClient;
use anyhow::Result;
use bytes::Bytes;
use futures_util::{Stream, StreamExt, stream};
use std::sync::Arc;

// How many sentences may be synthesizing concurrently. Output order is
// preserved regardless.
const SYNTH_LOOKAHEAD: usize = 2;

/// Splits text on `.`, `!`, or `?` followed by whitespace (or end of text).
/// A terminator followed by a non-space, as in a decimal number, does not
/// split.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?')
            && chars.peek().map(|next| next.is_whitespace()).unwrap_or(true)
        {
            let sentence = current.trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            current.clear();
        }
    }
    let tail = current.trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

/// Synthesizes each sentence of `text` and yields the clips in order, with
/// up to `SYNTH_LOOKAHEAD` synthesis calls in flight.
pub fn synthesize_stream(
    speech: Arc<dyn SpeechClient>,
    text: String,
    language_code: String,
) -> impl Stream<Item = Result<Bytes>> + Send {
    let sentences = split_sentences(&text);
    stream::iter(sentences)
        .map(move |sentence| {
            let speech = speech.clone();
            let language = language_code.clone();
            async move { speech.synthesize(&sentence, &language).await }
        })
        .buffered(SYNTH_LOOKAHEAD)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::MockSpeechClient;

    #[test]
    fn splits_on_terminators_followed_by_whitespace() {
        let sentences = split_sentences("First step done. Second one? Great! Keep going");
        assert_eq!(
            sentences,
            vec!["First step done.", "Second one?", "Great!", "Keep going"]
        );
    }

    #[test]
    fn decimal_points_do_not_split() {
        let sentences = split_sentences("Pi is about 3.14 in value. Neat.");
        assert_eq!(sentences, vec!["Pi is about 3.14 in value.", "Neat."]);
    }

    #[test]
    fn single_sentence_passes_through_whole() {
        assert_eq!(split_sentences("just one thought"), vec!["just one thought"]);
        assert!(split_sentences("   ").is_empty());
    }

    #[tokio::test]
    async fn stream_preserves_sentence_order() {
        let mut mock = MockSpeechClient::new();
        mock.expect_synthesize().returning(|text, _| {
            let text = text.to_string();
            Ok(Bytes::from(text.into_bytes()))
        });

        let speech: Arc<dyn SpeechClient> = Arc::new(mock);
        let clips: Vec<_> = synthesize_stream(
            speech,
            "One done. Two done. Three".to_string(),
            "en-IN".to_string(),
        )
        .collect()
        .await;

        let clips: Vec<Bytes> = clips.into_iter().collect::<Result<_>>().unwrap();
        assert_eq!(
            clips,
            vec![
                Bytes::from("One done."),
                Bytes::from("Two done."),
                Bytes::from("Three")
            ]
        );
    }
}
