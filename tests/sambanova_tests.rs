// SambaNova dispatch tests against a mock upstream

use futures::StreamExt;
use mockito::{Matcher, Server};
use serde_json::json;
use std::sync::Arc;
use switchyard::config::Config;
use switchyard::providers::{ChatProvider, sambanova::SambaNovaProvider};
use switchyard::types::{Message, ProviderDescriptor, Role};
use switchyard::{DispatchError, Dispatcher, ProviderError, ProviderOutput, ProviderRegistry, ProviderRequest};

const MODEL: &str = "Meta-Llama-3.3-70B-Instruct";

fn descriptor() -> ProviderDescriptor {
    ProviderDescriptor {
        id: "sambanova".to_string(),
        name: "SambaNova".to_string(),
        description: "SambaNova Cloud".to_string(),
        version: "1.0.0".to_string(),
        models: vec![MODEL.to_string()],
        default_model: MODEL.to_string(),
    }
}

fn dispatcher(endpoint: &str, api_key: Option<&str>) -> Dispatcher {
    let provider = SambaNovaProvider::new(
        "sambanova",
        endpoint.to_string(),
        api_key.map(str::to_string),
        reqwest::Client::new(),
    );

    let mut registry = ProviderRegistry::new();
    registry.register(descriptor(), Some(Arc::new(provider) as Arc<dyn ChatProvider>));

    Dispatcher::from_config(&Config::default(), Arc::new(registry))
}

fn request() -> ProviderRequest {
    ProviderRequest {
        model: MODEL.to_string(),
        system_prompt: Some("You are terse.".to_string()),
        messages: Some(vec![Message {
            role: Role::User,
            content: "Say hi".to_string(),
        }]),
        temperature: Some(0.2),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_chat_completion_with_cost() {
    let mut server = Server::new_async().await;
    let upstream = server
        .mock("POST", "/v1/chat/completions")
        .match_header("authorization", "Bearer sn-test")
        .match_body(Matcher::PartialJson(json!({
            "model": MODEL,
            "messages": [
                {"role": "system", "content": "You are terse."},
                {"role": "user", "content": "Say hi"}
            ],
            "temperature": 0.2,
            "stream": false
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "id": "chatcmpl-1",
                "object": "chat.completion",
                "model": MODEL,
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "Hi."},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 1000, "completion_tokens": 500, "total_tokens": 1500}
            })
            .to_string(),
        )
        .create_async()
        .await;

    let output = dispatcher(&server.url(), Some("sn-test"))
        .execute("sambanova", request())
        .await
        .unwrap();

    let response = output.into_response().expect("plain response");
    assert_eq!(response.content, "Hi.");

    let tokens = response.tokens.unwrap();
    assert_eq!((tokens.prompt, tokens.completion, tokens.total), (1000, 500, 1500));

    let cost = response.cost.unwrap();
    assert!((cost.input - 0.0006).abs() < 1e-12);
    assert!((cost.output - 0.0006).abs() < 1e-12);
    assert!((cost.total - 0.0012).abs() < 1e-12);
    assert!(response.timing.is_some());

    upstream.assert_async().await;
}

#[tokio::test]
async fn test_missing_api_key_never_calls_upstream() {
    let mut server = Server::new_async().await;
    let upstream = server
        .mock("POST", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let err = dispatcher(&server.url(), None)
        .execute("sambanova", request())
        .await
        .unwrap_err();

    assert!(matches!(
        &err,
        DispatchError::Provider(ProviderError::MissingCredentials { provider }) if provider == "SambaNova"
    ));
    assert_eq!(err.to_string(), "SambaNova API key is required");

    upstream.assert_async().await;
}

#[tokio::test]
async fn test_upstream_error_keeps_status_and_body() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/v1/chat/completions")
        .with_status(401)
        .with_body(r#"{"error":"invalid api key"}"#)
        .create_async()
        .await;

    let err = dispatcher(&server.url(), Some("bad-key"))
        .execute("sambanova", request())
        .await
        .unwrap_err();

    match err {
        DispatchError::Provider(ProviderError::Upstream { status, body, .. }) => {
            assert_eq!(status, 401);
            assert!(body.contains("invalid api key"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_reasoning_model_drops_temperature() {
    let mut server = Server::new_async().await;
    let upstream = server
        .mock("POST", "/v1/chat/completions")
        .match_body(Matcher::Json(json!({
            "model": "DeepSeek-R1",
            "messages": [
                {"role": "system", "content": "You are terse."},
                {"role": "user", "content": "Say hi"}
            ],
            "stream": false
        })))
        .with_status(200)
        .with_body(
            json!({
                "choices": [{"message": {"role": "assistant", "content": "ok"}}]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let mut req = request();
    req.model = "DeepSeek-R1".to_string();

    let response = dispatcher(&server.url(), Some("sn-test"))
        .execute("sambanova", req)
        .await
        .unwrap()
        .into_response()
        .unwrap();

    // Missing usage still reports zeroed tokens
    let tokens = response.tokens.unwrap();
    assert_eq!(tokens.total, 0);
    assert_eq!(response.cost.unwrap().total, 0.0);

    upstream.assert_async().await;
}

#[tokio::test]
async fn test_streaming_yields_content_deltas() {
    let mut server = Server::new_async().await;
    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
        "data: [DONE]\n\n",
    );
    server
        .mock("POST", "/v1/chat/completions")
        .match_body(Matcher::PartialJson(json!({"stream": true})))
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(body)
        .create_async()
        .await;

    let mut req = request();
    req.stream = true;

    let output = dispatcher(&server.url(), Some("sn-test"))
        .execute("sambanova", req)
        .await
        .unwrap();

    let ProviderOutput::Streaming(streaming) = output else {
        panic!("expected a streaming execution, got {output:?}");
    };
    assert_eq!(streaming.execution.provider, "sambanova");
    assert_eq!(streaming.execution.model, MODEL);

    let chunks: Vec<_> = streaming.stream.collect().await;
    let text: String = chunks
        .into_iter()
        .map(|chunk| String::from_utf8(chunk.unwrap().to_vec()).unwrap())
        .collect();
    assert_eq!(text, "Hello");
}

#[tokio::test]
async fn test_registry_discovers_sambanova_models() {
    let mut server = Server::new_async().await;
    let catalog = server
        .mock("GET", "/v1/models")
        .match_header("authorization", "Bearer sn-test")
        .with_status(200)
        .with_body(
            json!({
                "models": [
                    {"name": "Llama 3.3 70B", "model": MODEL},
                    {"name": "DeepSeek R1", "model": "DeepSeek-R1"}
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let config = Config::from_toml_str(&format!(
        r#"
        [providers.sambanova]
        kind = "sambanova"
        enabled = true
        api_key = "sn-test"
        endpoint = "{}"
        discover_models = true
        "#,
        server.url()
    ))
    .unwrap();

    let registry = ProviderRegistry::build(&config).await;
    let descriptor = registry.lookup("sambanova").unwrap();

    assert_eq!(descriptor.models, vec![MODEL, "DeepSeek-R1"]);
    assert_eq!(descriptor.default_model, MODEL);
    catalog.assert_async().await;
}

#[tokio::test]
async fn test_registry_survives_discovery_failure() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/v1/models")
        .with_status(503)
        .create_async()
        .await;

    let config = Config::from_toml_str(&format!(
        r#"
        [providers.sambanova]
        kind = "sambanova"
        enabled = true
        api_key = "sn-test"
        endpoint = "{}"
        discover_models = true
        "#,
        server.url()
    ))
    .unwrap();

    let registry = ProviderRegistry::build(&config).await;

    assert!(registry.lookup("sambanova").unwrap().models.is_empty());
    assert!(registry.executor("sambanova").is_ok());
}
