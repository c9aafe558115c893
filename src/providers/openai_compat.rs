use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::providers::ChatProvider;
use crate::types::{
    ByteStream, ExecutionInfo, ProviderOutput, ProviderRequest, ProviderResponse, Role,
    StreamingExecution, Timing, TokenUsage, ToolCall,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Chat provider speaking the OpenAI `/v1/chat/completions` dialect
pub struct OpenAICompatProvider {
    id: String,
    display_name: String,
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

// OpenAI-compatible wire types
#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<WireTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<&'static str>,
    pub stream: bool,
}

#[derive(Debug, Serialize)]
pub struct WireMessage {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct WireTool {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: WireFunction,
}

#[derive(Debug, Serialize)]
pub struct WireFunction {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: String,
    function: WireFunctionCall,
}

#[derive(Debug, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

// Streaming types
#[derive(Deserialize, Debug)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize, Debug)]
struct StreamChoice {
    delta: Delta,
}

#[derive(Deserialize, Debug)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Deserialize, Debug)]
struct ModelEntry {
    id: String,
}

impl OpenAICompatProvider {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        endpoint: impl Into<String>,
        api_key: Option<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            client,
        }
    }

    pub fn from_config(id: &str, config: &ProviderConfig, client: reqwest::Client) -> Self {
        Self::new(
            id,
            config.name.clone().unwrap_or_else(|| id.to_string()),
            config.endpoint.clone().unwrap_or_default(),
            config.resolve_api_key(),
            client,
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    /// Map a canonical model id (`<provider>/<model>`) to the name the upstream expects
    pub fn normalize_model_name(&self, model: &str) -> String {
        let model = model.trim();
        model
            .strip_prefix(self.id.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(model)
            .to_string()
    }

    /// Build the upstream payload: system prompt, then context, then explicit messages
    pub fn build_payload(&self, request: &ProviderRequest) -> ChatCompletionRequest {
        let mut messages = Vec::new();
        if let Some(system) = request.system_prompt.as_deref().filter(|s| !s.is_empty()) {
            messages.push(WireMessage {
                role: Role::System.as_str(),
                content: system.to_string(),
            });
        }
        if let Some(context) = request.context.as_deref().filter(|c| !c.is_empty()) {
            messages.push(WireMessage {
                role: Role::User.as_str(),
                content: context.to_string(),
            });
        }
        for message in request.messages.iter().flatten() {
            messages.push(WireMessage {
                role: message.role.as_str(),
                content: message.content.clone(),
            });
        }

        let tools: Vec<WireTool> = request
            .tools
            .iter()
            .flatten()
            .map(|tool| WireTool {
                kind: "function",
                function: WireFunction {
                    name: tool.id.clone(),
                    description: tool.description.clone(),
                    parameters: tool.parameters.clone(),
                },
            })
            .collect();
        let tool_choice = (!tools.is_empty()).then_some("auto");

        ChatCompletionRequest {
            model: self.normalize_model_name(&request.model),
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            tools,
            tool_choice,
            stream: request.stream,
        }
    }

    /// Normalize an upstream completion. `model` echoes the caller's model id.
    pub fn into_response(body: ChatCompletionResponse, model: &str) -> ProviderResponse {
        let message = body.choices.into_iter().next().map(|c| c.message);

        let (content, tool_calls) = match message {
            Some(message) => {
                let calls: Vec<ToolCall> = message
                    .tool_calls
                    .into_iter()
                    .map(|call| ToolCall {
                        id: call.id,
                        arguments: serde_json::from_str(&call.function.arguments)
                            .unwrap_or(serde_json::Value::String(call.function.arguments)),
                        name: call.function.name,
                    })
                    .collect();
                (
                    message.content.unwrap_or_default(),
                    (!calls.is_empty()).then_some(calls),
                )
            }
            None => (String::new(), None),
        };

        let usage = body.usage.unwrap_or_default();

        ProviderResponse {
            content,
            model: model.to_string(),
            tokens: Some(TokenUsage {
                prompt: usage.prompt_tokens,
                completion: usage.completion_tokens,
                total: usage.total_tokens,
            }),
            tool_calls,
            cost: None,
            timing: None,
        }
    }

    fn require_api_key(&self) -> Result<&str, ProviderError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ProviderError::MissingCredentials {
                provider: self.display_name.clone(),
            })
    }

    /// Run a chat completion against the upstream
    pub async fn chat(&self, request: ProviderRequest) -> Result<ProviderOutput, ProviderError> {
        info!(
            provider = %self.id,
            model = %request.model,
            has_system_prompt = request.system_prompt.is_some(),
            has_context = request.has_context(),
            tool_count = request.tools.as_ref().map_or(0, Vec::len),
            has_response_format = request.response_format.is_some(),
            stream = request.stream,
            "Preparing chat completion request"
        );

        let api_key = self.require_api_key()?;
        let start_time = Utc::now();
        let payload = self.build_payload(&request);

        let res = self
            .client
            .post(format!("{}/v1/chat/completions", self.endpoint))
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await?;

        if !res.status().is_success() {
            let err = ProviderError::from_response(res).await;
            error!(provider = %self.id, error = %err, "Chat completion request failed");
            return Err(err);
        }

        if request.stream {
            return Ok(ProviderOutput::Streaming(StreamingExecution {
                stream: stream_content(res),
                execution: ExecutionInfo {
                    provider: self.id.clone(),
                    model: request.model,
                    started_at: start_time,
                },
            }));
        }

        let body: ChatCompletionResponse = res.json().await?;
        let mut response = Self::into_response(body, &request.model);
        response.timing = Some(timing_since(start_time));

        Ok(ProviderOutput::Response(response))
    }

    /// GET `/v1/models` in the OpenAI `{ data: [{ id }] }` shape
    pub async fn fetch_models_json(&self) -> Result<serde_json::Value, ProviderError> {
        let api_key = self.require_api_key()?;
        let res = self
            .client
            .get(format!("{}/v1/models", self.endpoint))
            .bearer_auth(api_key)
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(ProviderError::from_response(res).await);
        }

        Ok(res.json().await?)
    }

    pub fn parse_model_list(value: serde_json::Value) -> Result<Vec<String>, ProviderError> {
        let list: ModelList = serde_json::from_value(value)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        Ok(list.data.into_iter().map(|m| m.id).collect())
    }
}

pub(crate) fn timing_since(start_time: DateTime<Utc>) -> Timing {
    let end_time = Utc::now();
    Timing {
        start_time,
        end_time,
        duration_ms: (end_time - start_time).num_milliseconds(),
    }
}

/// Split complete SSE events off the front of `buffer`, returning their `data:` payloads
pub fn drain_sse_data(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut payloads = Vec::new();

    while let Some((event_end, separator)) = find_event_end(buffer) {
        let event: Vec<u8> = buffer.drain(..event_end + separator).collect();
        let event = String::from_utf8_lossy(&event[..event_end]);
        for line in event.split(['\r', '\n']) {
            if let Some(data) = line.strip_prefix("data:") {
                payloads.push(data.trim().to_string());
            }
        }
    }

    payloads
}

/// Position and length of the first blank-line separator (`\n\n`, `\r\n\r\n` or `\r\r`)
fn find_event_end(buffer: &[u8]) -> Option<(usize, usize)> {
    (0..buffer.len()).find_map(|i| match &buffer[i..] {
        [b'\r', b'\n', b'\r', b'\n', ..] => Some((i, 4)),
        [b'\n', b'\n', ..] | [b'\r', b'\r', ..] => Some((i, 2)),
        _ => None,
    })
}

/// Turn an upstream SSE body into a stream of content deltas
fn stream_content(res: reqwest::Response) -> ByteStream {
    let stream = async_stream::stream! {
        let mut upstream = res.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();

        let mut finished = false;

        while !finished {
            match upstream.next().await {
                Some(Ok(bytes)) => buffer.extend_from_slice(&bytes),
                Some(Err(e)) => {
                    yield Err(ProviderError::from(e));
                    return;
                }
                None => {
                    // Flush an unterminated trailing event
                    finished = true;
                    if !buffer.is_empty() {
                        buffer.extend_from_slice(b"\n\n");
                    }
                }
            }

            for data in drain_sse_data(&mut buffer) {
                if data == "[DONE]" {
                    return;
                }

                match serde_json::from_str::<StreamChunk>(&data) {
                    Ok(chunk) => {
                        let content = chunk
                            .choices
                            .into_iter()
                            .next()
                            .and_then(|c| c.delta.content)
                            .filter(|c| !c.is_empty());
                        if let Some(content) = content {
                            yield Ok(Bytes::from(content));
                        }
                    }
                    Err(e) => warn!("Skipping malformed stream chunk: {}", e),
                }
            }
        }
    };

    Box::pin(stream)
}

#[async_trait]
impl ChatProvider for OpenAICompatProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn list_models(&self) -> Result<Option<Vec<String>>, ProviderError> {
        let value = self.fetch_models_json().await?;
        Ok(Some(Self::parse_model_list(value)?))
    }

    async fn execute(&self, request: ProviderRequest) -> Result<ProviderOutput, ProviderError> {
        self.chat(request).await
    }
}
