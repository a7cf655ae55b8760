//! LLM Capability Port
//!
//! The engine's sole non-deterministic dependency, behind a trait so the
//! dialog nodes stay testable. Two call shapes exist: free-form text, and a
//! structured call that forces a single tool call whose arguments must match
//! a schema. A model that declines the tool call yields `Ok(None)`; callers
//! treat that the same as a transport error and take their deterministic
//! fallback branch.

use anyhow::{Context, Result, anyhow};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestUserMessageArgs, ChatCompletionToolArgs,
        ChatCompletionToolChoiceOption, CreateChatCompletionRequestArgs, FunctionObjectArgs,
    },
};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Names and describes the single tool a structured call forces.
#[derive(Debug, Clone)]
pub struct StructuredTool {
    pub name: &'static str,
    pub description: &'static str,
    pub schema: Value,
}

/// A generic client for the chat model.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Free-form call: one prompt in, plain text out. May fail on
    /// transport, timeout, or rate-limit problems.
    async fn invoke(&self, prompt: &str) -> Result<String>;

    /// Structured call: forces the given tool and returns its raw JSON
    /// arguments, or `None` when the model declines to call it.
    async fn invoke_structured(&self, prompt: &str, tool: StructuredTool) -> Result<Option<Value>>;
}

/// Builds the tool description for a schema type and deserializes the reply.
///
/// Malformed arguments are folded into `None` rather than an error: the
/// caller's fallback branch handles both outcomes identically.
pub async fn call_structured<T>(
    client: &dyn LlmClient,
    prompt: &str,
    name: &'static str,
    description: &'static str,
) -> Result<Option<T>>
where
    T: DeserializeOwned + JsonSchema,
{
    let schema = serde_json::to_value(schemars::schema_for!(T))
        .context("Failed to serialize tool schema")?;
    let tool = StructuredTool {
        name,
        description,
        schema,
    };
    match client.invoke_structured(prompt, tool).await? {
        Some(args) => Ok(serde_json::from_value(args).ok()),
        None => Ok(None),
    }
}

/// An implementation of `LlmClient` for any OpenAI-compatible API.
pub struct OpenAiCompatibleClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiCompatibleClient {
    /// Creates a new client for an OpenAI-compatible service.
    ///
    /// # Arguments
    ///
    /// * `config` - The configuration for the OpenAI client, including API key and base URL.
    /// * `model` - The specific model identifier to use for chat completions (e.g., "gpt-4o").
    pub fn new(config: OpenAIConfig, model: String) -> Self {
        Self {
            client: Client::with_config(config),
            model,
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn invoke(&self, prompt: &str) -> Result<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![
                ChatCompletionRequestUserMessageArgs::default()
                    .content(prompt)
                    .build()?
                    .into(),
            ])
            .build()?;

        let response = self.client.chat().create(request).await?;
        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| anyhow!("LLM response had no text content"))?;
        Ok(content.trim().to_string())
    }

    async fn invoke_structured(&self, prompt: &str, tool: StructuredTool) -> Result<Option<Value>> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![
                ChatCompletionRequestUserMessageArgs::default()
                    .content(prompt)
                    .build()?
                    .into(),
            ])
            .tools(vec![
                ChatCompletionToolArgs::default()
                    .function(
                        FunctionObjectArgs::default()
                            .name(tool.name)
                            .description(tool.description)
                            .parameters(tool.schema)
                            .build()?,
                    )
                    .build()?,
            ])
            .tool_choice(ChatCompletionToolChoiceOption::Required)
            .build()?;

        let response = self.client.chat().create(request).await?;
        let choice = match response.choices.first() {
            Some(choice) => choice,
            None => return Ok(None),
        };

        // "No tool call" is a normal, handled outcome, not an error.
        let args = choice
            .message
            .tool_calls
            .as_ref()
            .and_then(|calls| calls.first())
            .map(|call| call.function.arguments.clone());
        match args {
            Some(raw) => Ok(serde_json::from_str(&raw).ok()),
            None => Ok(None),
        }
    }
}
