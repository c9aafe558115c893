use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::error::ProviderError;

/// Chat message role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// A tool the model may call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

/// Requested shape of the model output.
///
/// Callers send either a JSON object or a string; the empty string means
/// no format was requested.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ResponseFormat {
    Text(String),
    Schema(serde_json::Value),
}

impl ResponseFormat {
    pub fn is_empty(&self) -> bool {
        matches!(self, ResponseFormat::Text(s) if s.is_empty())
    }
}

/// Provider-agnostic request
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRequest {
    #[serde(default)]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Message>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
    #[serde(default)]
    pub stream: bool,
}

impl ProviderRequest {
    /// True when the request carries non-empty prior context.
    pub fn has_context(&self) -> bool {
        self.context.as_deref().is_some_and(|c| !c.is_empty())
    }
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct TokenUsage {
    pub prompt: u32,
    pub completion: u32,
    pub total: u32,
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Per-token prices in USD per 1M tokens
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Pricing {
    pub input: f64,
    /// `cached_input` is accepted so TOML config can stay snake_case
    #[serde(default, alias = "cached_input", skip_serializing_if = "Option::is_none")]
    pub cached_input: Option<f64>,
    pub output: f64,
}

/// Estimated monetary cost of a call
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Cost {
    pub input: f64,
    pub output: f64,
    pub total: f64,
    pub pricing: Pricing,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Timing {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: i64,
}

/// Plain (non-streaming) provider result
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderResponse {
    pub content: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<TokenUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<Cost>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing: Option<Timing>,
}

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ProviderError>> + Send>>;

/// Side-channel metadata for a streamed execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionInfo {
    pub provider: String,
    pub model: String,
    pub started_at: DateTime<Utc>,
}

/// Incremental content paired with execution metadata
pub struct StreamingExecution {
    pub stream: ByteStream,
    pub execution: ExecutionInfo,
}

/// Raw binary payload (audio and the like) with its MIME type
pub struct BinaryStream {
    pub content_type: String,
    pub stream: ByteStream,
}

/// Everything a provider can hand back. Only `Response` carries usage and cost.
pub enum ProviderOutput {
    Response(ProviderResponse),
    Bytes(BinaryStream),
    Streaming(StreamingExecution),
}

impl ProviderOutput {
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderOutput::Response(_) => "response",
            ProviderOutput::Bytes(_) => "bytes",
            ProviderOutput::Streaming(_) => "streaming",
        }
    }

    pub fn into_response(self) -> Option<ProviderResponse> {
        match self {
            ProviderOutput::Response(r) => Some(r),
            _ => None,
        }
    }
}

impl std::fmt::Debug for ProviderOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderOutput::Response(r) => f.debug_tuple("Response").field(r).finish(),
            ProviderOutput::Bytes(b) => f.debug_tuple("Bytes").field(&b.content_type).finish(),
            ProviderOutput::Streaming(s) => {
                f.debug_tuple("Streaming").field(&s.execution).finish()
            }
        }
    }
}

/// Provider metadata exposed by the registry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    pub version: String,
    pub models: Vec<String>,
    pub default_model: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), r#""user""#);
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), r#""assistant""#);
        assert_eq!(serde_json::to_string(&Role::System).unwrap(), r#""system""#);
    }

    #[test]
    fn test_request_from_camel_case_json() {
        let request: ProviderRequest = serde_json::from_str(
            r#"{
                "model": "Meta-Llama-3.3-70B-Instruct",
                "systemPrompt": "Be brief",
                "context": "earlier turn",
                "maxTokens": 256,
                "temperature": 0.2,
                "tools": [{"id": "search", "description": "Web search", "parameters": {"type": "object"}}]
            }"#,
        )
        .unwrap();

        assert_eq!(request.system_prompt.as_deref(), Some("Be brief"));
        assert_eq!(request.max_tokens, Some(256));
        assert_eq!(request.tools.as_ref().map(Vec::len), Some(1));
        assert!(request.has_context());
        assert!(!request.stream);
    }

    #[test]
    fn test_response_format_variants() {
        let empty: ResponseFormat = serde_json::from_str(r#""""#).unwrap();
        assert!(empty.is_empty());

        let schema: ResponseFormat = serde_json::from_str(r#"{"fields": []}"#).unwrap();
        assert!(matches!(schema, ResponseFormat::Schema(_)));
        assert!(!schema.is_empty());
    }

    #[test]
    fn test_has_context_ignores_empty_string() {
        let mut request = ProviderRequest::default();
        assert!(!request.has_context());

        request.context = Some(String::new());
        assert!(!request.has_context());

        request.context = Some("hi".to_string());
        assert!(request.has_context());
    }

    #[test]
    fn test_response_omits_unset_fields() {
        let response = ProviderResponse {
            content: "ok".to_string(),
            model: "m".to_string(),
            ..Default::default()
        };

        let value = serde_json::to_value(&response).unwrap();
        assert!(value.get("cost").is_none());
        assert!(value.get("tokens").is_none());
        assert!(value.get("toolCalls").is_none());
    }
}
