use std::time::Duration;

use anyhow::{anyhow, Result};
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, ResponseFormat, ResponseFormatJsonSchema,
    },
    Client,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;

/// Structured-extraction seam over the LLM. Implementations return the raw
/// JSON text of one completion; `parse_llm_json` is the only place that
/// turns model output into typed values.
#[async_trait]
pub trait LlmExtractor: Send + Sync {
    async fn extract(
        &self,
        system: &str,
        user: &str,
        schema_name: &str,
        schema: serde_json::Value,
    ) -> Result<String>;
}

pub struct OpenaiExtractor {
    client: Client<OpenAIConfig>,
    model: String,
    timeout: Duration,
}

impl OpenaiExtractor {
    pub fn new(api_key: String, model: String, timeout_secs: u64) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        OpenaiExtractor {
            client: Client::with_config(config),
            model,
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

#[async_trait]
impl LlmExtractor for OpenaiExtractor {
    async fn extract(
        &self,
        system: &str,
        user: &str,
        schema_name: &str,
        schema: serde_json::Value,
    ) -> Result<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.as_str())
            .messages([
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system)
                    .build()?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(user)
                    .build()?
                    .into(),
            ])
            .response_format(ResponseFormat::JsonSchema {
                json_schema: ResponseFormatJsonSchema {
                    description: None,
                    name: schema_name.to_string(),
                    schema: Some(schema),
                    strict: Some(true),
                },
            })
            .max_tokens(1500_u32)
            .build()?;

        // A hung completion must degrade one extraction, not stall a stage.
        let response = tokio::time::timeout(self.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| anyhow!("llm call '{}' timed out after {:?}", schema_name, self.timeout))??;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| anyhow!("No content in model response for '{}'", schema_name))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("no json payload in model output")]
    NoJson,
    #[error("model output does not match the expected shape: {0}")]
    BadShape(#[from] serde_json::Error),
}

/// The single narrow point where free-form model text becomes a typed
/// value. Tolerates code fences and prose around the payload; anything
/// else is an `ExtractError`, never a panic or a raw-text leak.
pub fn parse_llm_json<T: DeserializeOwned>(raw: &str) -> Result<T, ExtractError> {
    let trimmed = raw.trim();
    let start = trimmed.find(['{', '[']).ok_or(ExtractError::NoJson)?;
    let end = trimmed.rfind(['}', ']']).ok_or(ExtractError::NoJson)?;
    if end < start {
        return Err(ExtractError::NoJson);
    }
    Ok(serde_json::from_str(&trimmed[start..=end])?)
}

/// Convenience wrapper: one extraction call plus typed parsing.
pub async fn extract_as<T: DeserializeOwned>(
    llm: &dyn LlmExtractor,
    system: &str,
    user: &str,
    schema_name: &str,
    schema: serde_json::Value,
) -> Result<T> {
    let raw = llm.extract(system, user, schema_name, schema).await?;
    Ok(parse_llm_json(&raw)?)
}
