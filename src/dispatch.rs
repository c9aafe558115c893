use crate::capabilities::ModelCapabilities;
use crate::config::Config;
use crate::error::{DispatchError, ProviderError};
use crate::metrics::METRICS;
use crate::pricing::PricingTable;
use crate::registry::ProviderRegistry;
use crate::structured_output::apply_response_format;
use crate::types::{ProviderOutput, ProviderRequest};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Resolves, sanitizes, executes and prices provider requests
pub struct Dispatcher {
    registry: Arc<ProviderRegistry>,
    capabilities: ModelCapabilities,
    pricing: PricingTable,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        capabilities: ModelCapabilities,
        pricing: PricingTable,
    ) -> Self {
        Self {
            registry,
            capabilities,
            pricing,
        }
    }

    pub fn from_config(config: &Config, registry: Arc<ProviderRegistry>) -> Self {
        Self::new(
            registry,
            ModelCapabilities::from_config(&config.capabilities),
            PricingTable::from_config(&config.pricing),
        )
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Execute a request with the given provider
    pub async fn execute(
        &self,
        provider_id: &str,
        request: ProviderRequest,
    ) -> Result<ProviderOutput, DispatchError> {
        info!(
            provider = provider_id,
            model = %request.model,
            has_response_format = request.response_format.is_some(),
            "Executing request with provider"
        );

        let executor = self.registry.executor(provider_id)?;

        // Cached-input pricing applies when the caller resent prior context
        let use_cached_input = request.has_context();

        let mut request = self.capabilities.sanitize(request);
        apply_response_format(&mut request);

        let start = Instant::now();
        let result = executor.execute(request).await;
        METRICS
            .provider_duration_seconds
            .with_label_values(&[provider_id])
            .observe(start.elapsed().as_secs_f64());

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                record_failure(provider_id, &e);
                return Err(e.into());
            }
        };

        METRICS
            .provider_requests_total
            .with_label_values(&[provider_id, output.kind(), "success"])
            .inc();

        match output {
            ProviderOutput::Streaming(streaming) => {
                info!(provider = provider_id, "Provider returned streaming execution");
                Ok(ProviderOutput::Streaming(streaming))
            }
            ProviderOutput::Bytes(bytes) => {
                info!(provider = provider_id, content_type = %bytes.content_type, "Provider returned byte stream");
                Ok(ProviderOutput::Bytes(bytes))
            }
            ProviderOutput::Response(mut response) => {
                info!(
                    provider = provider_id,
                    model = %response.model,
                    content_length = response.content.len(),
                    has_tokens = response.tokens.is_some(),
                    tool_calls = response.tool_calls.as_ref().map_or(0, Vec::len),
                    "Provider response received"
                );

                if let Some(tokens) = response.tokens {
                    let cost = self.pricing.calculate_cost(
                        &response.model,
                        tokens.prompt,
                        tokens.completion,
                        use_cached_input,
                    );

                    let model_label = self.pricing.metric_label(&response.model);
                    METRICS
                        .tokens_used_total
                        .with_label_values(&[provider_id, &model_label, "prompt"])
                        .inc_by(tokens.prompt as f64);
                    METRICS
                        .tokens_used_total
                        .with_label_values(&[provider_id, &model_label, "completion"])
                        .inc_by(tokens.completion as f64);
                    METRICS
                        .estimated_cost_usd
                        .with_label_values(&[provider_id, &model_label])
                        .inc_by(cost.total);

                    response.cost = Some(cost);
                }

                Ok(ProviderOutput::Response(response))
            }
        }
    }
}

fn record_failure(provider_id: &str, error: &ProviderError) {
    let error_type = match error {
        ProviderError::MissingCredentials { .. } => "missing_credentials",
        ProviderError::Upstream { .. } => "upstream",
        ProviderError::Timeout => "timeout",
        ProviderError::Transport(_) => "transport",
        ProviderError::InvalidResponse(_) => "invalid_response",
        ProviderError::EmptyPayload => "empty_payload",
        ProviderError::InvalidRequest(_) => "invalid_request",
    };

    METRICS
        .provider_requests_total
        .with_label_values(&[provider_id, "none", "error"])
        .inc();
    METRICS
        .provider_errors_total
        .with_label_values(&[provider_id, error_type])
        .inc();

    warn!(provider = provider_id, error = %error, "Provider request failed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ChatProvider;
    use crate::types::{
        BinaryStream, ExecutionInfo, ProviderDescriptor, ProviderResponse, ResponseFormat,
        StreamingExecution, TokenUsage,
    };
    use async_trait::async_trait;
    use bytes::Bytes;
    use serde_json::json;
    use std::sync::Mutex;

    enum Reply {
        Plain(Option<TokenUsage>),
        Bytes,
        Streaming,
        Fail,
    }

    /// Records the request it receives and answers with a canned reply
    struct Recorder {
        reply: Reply,
        seen: Mutex<Option<ProviderRequest>>,
    }

    impl Recorder {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply,
                seen: Mutex::new(None),
            })
        }

        fn seen(&self) -> ProviderRequest {
            self.seen.lock().unwrap().clone().expect("provider was not called")
        }
    }

    #[async_trait]
    impl ChatProvider for Recorder {
        fn id(&self) -> &str {
            "recorder"
        }

        async fn execute(&self, request: ProviderRequest) -> Result<ProviderOutput, ProviderError> {
            let model = request.model.clone();
            *self.seen.lock().unwrap() = Some(request);

            let payload: crate::types::ByteStream =
                Box::pin(futures::stream::iter(vec![Ok(Bytes::from_static(b"x"))]));

            match self.reply {
                Reply::Plain(tokens) => Ok(ProviderOutput::Response(ProviderResponse {
                    content: "done".to_string(),
                    model,
                    tokens,
                    ..Default::default()
                })),
                Reply::Bytes => Ok(ProviderOutput::Bytes(BinaryStream {
                    content_type: "audio/mpeg".to_string(),
                    stream: payload,
                })),
                Reply::Streaming => Ok(ProviderOutput::Streaming(StreamingExecution {
                    stream: payload,
                    execution: ExecutionInfo {
                        provider: "recorder".to_string(),
                        model,
                        started_at: chrono::Utc::now(),
                    },
                })),
                Reply::Fail => Err(ProviderError::Upstream {
                    status: 401,
                    reason: "Unauthorized".to_string(),
                    body: "bad key".to_string(),
                }),
            }
        }
    }

    fn dispatcher_with(provider: Arc<Recorder>) -> Dispatcher {
        let mut registry = ProviderRegistry::new();
        registry.register(
            ProviderDescriptor {
                id: "recorder".to_string(),
                name: "Recorder".to_string(),
                description: String::new(),
                version: "1.0.0".to_string(),
                models: vec!["gpt-4o".to_string()],
                default_model: "gpt-4o".to_string(),
            },
            Some(provider as Arc<dyn ChatProvider>),
        );
        Dispatcher::new(
            Arc::new(registry),
            ModelCapabilities::default(),
            PricingTable::default(),
        )
    }

    fn usage() -> Option<TokenUsage> {
        Some(TokenUsage { prompt: 1_000_000, completion: 0, total: 1_000_000 })
    }

    fn request(model: &str) -> ProviderRequest {
        ProviderRequest {
            model: model.to_string(),
            system_prompt: Some("Original prompt".to_string()),
            temperature: Some(0.5),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_unknown_provider() {
        let dispatcher = dispatcher_with(Recorder::new(Reply::Plain(None)));
        let err = dispatcher.execute("missing", request("gpt-4o")).await.unwrap_err();
        assert!(matches!(err, DispatchError::ProviderNotFound(id) if id == "missing"));
    }

    #[tokio::test]
    async fn test_catalog_provider_cannot_execute() {
        let mut registry = ProviderRegistry::new();
        registry.register(
            ProviderDescriptor {
                id: "browser".to_string(),
                name: "Browser".to_string(),
                description: String::new(),
                version: "1.0.0".to_string(),
                models: vec!["llama3.2".to_string()],
                default_model: String::new(),
            },
            None,
        );
        let dispatcher = Dispatcher::new(Arc::new(registry), ModelCapabilities::default(), PricingTable::default());

        let err = dispatcher.execute("browser", request("llama3.2")).await.unwrap_err();
        assert!(matches!(err, DispatchError::ExecutorMissing(_)));
    }

    #[tokio::test]
    async fn test_temperature_stripped_before_execution() {
        let provider = Recorder::new(Reply::Plain(None));
        let dispatcher = dispatcher_with(provider.clone());

        dispatcher.execute("recorder", request("o3-mini")).await.unwrap();
        assert_eq!(provider.seen().temperature, None);

        dispatcher.execute("recorder", request("gpt-4o")).await.unwrap();
        assert_eq!(provider.seen().temperature, Some(0.5));
    }

    #[tokio::test]
    async fn test_empty_response_format_cleared() {
        let provider = Recorder::new(Reply::Plain(None));
        let dispatcher = dispatcher_with(provider.clone());

        let mut req = request("gpt-4o");
        req.response_format = Some(ResponseFormat::Text(String::new()));
        dispatcher.execute("recorder", req).await.unwrap();

        let seen = provider.seen();
        assert_eq!(seen.response_format, None);
        assert_eq!(seen.system_prompt.as_deref(), Some("Original prompt"));
    }

    #[tokio::test]
    async fn test_structured_output_appended() {
        let provider = Recorder::new(Reply::Plain(None));
        let dispatcher = dispatcher_with(provider.clone());

        let format = ResponseFormat::Schema(json!({"fields": [{"name": "answer", "type": "string"}]}));
        let instructions = crate::structured_output::instructions(&format);
        let mut req = request("gpt-4o");
        req.response_format = Some(format);
        dispatcher.execute("recorder", req).await.unwrap();

        let expected = format!("Original prompt\n\n{instructions}").trim().to_string();
        assert_eq!(provider.seen().system_prompt, Some(expected));
    }

    #[tokio::test]
    async fn test_cost_uses_cached_rate_with_context() {
        let dispatcher = dispatcher_with(Recorder::new(Reply::Plain(usage())));

        let mut req = request("gpt-4o");
        req.context = Some("earlier conversation".to_string());
        let cached = dispatcher.execute("recorder", req).await.unwrap().into_response().unwrap();
        assert_eq!(cached.cost.unwrap().input, 1.25);

        let mut req = request("gpt-4o");
        req.context = Some(String::new());
        let standard = dispatcher.execute("recorder", req).await.unwrap().into_response().unwrap();
        assert_eq!(standard.cost.unwrap().input, 2.5);

        let none = dispatcher
            .execute("recorder", request("gpt-4o"))
            .await
            .unwrap()
            .into_response()
            .unwrap();
        assert_eq!(none.cost.unwrap().input, 2.5);
    }

    #[tokio::test]
    async fn test_no_usage_means_no_cost() {
        let dispatcher = dispatcher_with(Recorder::new(Reply::Plain(None)));
        let response = dispatcher
            .execute("recorder", request("gpt-4o"))
            .await
            .unwrap()
            .into_response()
            .unwrap();
        assert!(response.cost.is_none());
    }

    #[tokio::test]
    async fn test_streams_pass_through_untouched() {
        let dispatcher = dispatcher_with(Recorder::new(Reply::Streaming));
        let output = dispatcher.execute("recorder", request("gpt-4o")).await.unwrap();
        assert!(matches!(output, ProviderOutput::Streaming(ref s) if s.execution.model == "gpt-4o"));
        assert!(output.into_response().is_none());

        let dispatcher = dispatcher_with(Recorder::new(Reply::Bytes));
        let output = dispatcher.execute("recorder", request("gpt-4o")).await.unwrap();
        assert!(matches!(output, ProviderOutput::Bytes(ref b) if b.content_type == "audio/mpeg"));
    }

    #[tokio::test]
    async fn test_provider_errors_propagate_unchanged() {
        let dispatcher = dispatcher_with(Recorder::new(Reply::Fail));
        let err = dispatcher.execute("recorder", request("gpt-4o")).await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Provider(ProviderError::Upstream { status: 401, .. })
        ));
    }
}
