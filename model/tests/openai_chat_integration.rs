use httpmock::prelude::*;
use model::{
    ChatMessage, ChatRequest, FinishReason, ModelError, ModelProvider, OpenAiConfig,
    OpenAiProvider, SpeechTranscriber,
};
use serde_json::json;

fn make_provider(server: &MockServer) -> OpenAiProvider {
    OpenAiProvider::new(OpenAiConfig::new("sk-test").with_base_url(server.base_url()))
        .expect("provider creation")
}

#[tokio::test]
async fn test_basic_chat() {
    let server = MockServer::start();

    let chat_mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/chat/completions")
            .header("authorization", "Bearer sk-test")
            .json_body_partial(r#"{"model": "gpt-4.1-mini"}"#);
        then.status(200).json_body(json!({
            "choices": [{
                "message": {"role": "assistant", "content": "2+2 is 4."},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 7, "total_tokens": 19}
        }));
    });

    let provider = make_provider(&server);
    let request = ChatRequest::new("gpt-4.1-mini", vec![ChatMessage::user("What is 2+2?")])
        .with_temperature(0.8);

    let response = provider.chat(request).await.expect("chat failed");

    chat_mock.assert();
    assert_eq!(response.choices.len(), 1);
    assert_eq!(response.first_content(), Some("2+2 is 4."));
    assert_eq!(
        response.choices[0].finish_reason,
        Some(FinishReason::Stop)
    );

    let usage = response.usage.expect("usage must exist");
    assert_eq!(usage.total_tokens, 19);
}

#[tokio::test]
async fn test_chat_authentication_error() {
    let server = MockServer::start();

    server.mock(|when, then| {
        when.method(POST).path("/v1/chat/completions");
        then.status(401).json_body(json!({"error": {"message": "bad key"}}));
    });

    let provider = make_provider(&server);
    let request = ChatRequest::new("gpt-4.1-mini", vec![ChatMessage::user("hi")]);

    let err = provider.chat(request).await.expect_err("must fail");
    assert!(matches!(err, ModelError::Authentication));
}

#[tokio::test]
async fn test_chat_rate_limit() {
    let server = MockServer::start();

    server.mock(|when, then| {
        when.method(POST).path("/v1/chat/completions");
        then.status(429).body("slow down");
    });

    let provider = make_provider(&server);
    let request = ChatRequest::new("gpt-4.1-mini", vec![ChatMessage::user("hi")]);

    let err = provider.chat(request).await.expect_err("must fail");
    assert!(matches!(err, ModelError::RateLimit));
}

#[tokio::test]
async fn test_list_models_and_health() {
    let server = MockServer::start();

    server.mock(|when, then| {
        when.method(GET).path("/v1/models");
        then.status(200).json_body(json!({
            "data": [
                {"id": "gpt-4.1-mini", "owned_by": "openai"},
                {"id": "whisper-1", "owned_by": "openai"}
            ]
        }));
    });

    let provider = make_provider(&server);

    let models = provider.list_models().await.expect("list_models failed");
    assert_eq!(models.len(), 2);
    assert!(models.iter().any(|m| m.name == "gpt-4.1-mini"));

    provider.health_check().await.expect("health_check failed");
}

#[tokio::test]
async fn test_transcription() {
    let server = MockServer::start();

    let mock = server.mock(|when, then| {
        when.method(POST).path("/v1/audio/transcriptions");
        then.status(200).json_body(json!({"text": "привет из голосового"}));
    });

    let provider = make_provider(&server);

    let text = provider
        .transcribe(vec![0u8; 64], "voice.oga")
        .await
        .expect("transcribe failed");

    mock.assert();
    assert_eq!(text, "привет из голосового");
}
