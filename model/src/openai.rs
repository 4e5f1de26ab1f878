use crate::config::OpenAiConfig;
use crate::provider::{ModelError, ModelProvider, ModelResult, SpeechTranscriber};
use crate::types::{
    ChatMessage, ChatRequest, ChatResponse, Choice, FinishReason, MessageRole, ModelInfo, Usage,
};
use async_trait::async_trait;
use reqwest::multipart;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

/// Chat completion request in the OpenAI wire format
#[derive(Debug, Clone, Serialize)]
struct ApiChatRequest {
    model: String,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiChatResponse {
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiModelsResponse {
    data: Vec<ApiModelData>,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiModelData {
    id: String,
    owned_by: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiTranscription {
    text: String,
}

pub struct OpenAiProvider {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig) -> ModelResult<Self> {
        config
            .validate()
            .map_err(|msg| ModelError::InvalidConfig { message: msg })?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ModelError::Unknown {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client, config })
    }

    /// Default chat model from the configuration.
    pub fn chat_model(&self) -> &str {
        &self.config.chat_model
    }

    fn convert_message_role(role: &MessageRole) -> String {
        match role {
            MessageRole::System => "system".to_string(),
            MessageRole::User => "user".to_string(),
            MessageRole::Assistant => "assistant".to_string(),
        }
    }

    fn convert_message_to_api(msg: &ChatMessage) -> ApiMessage {
        ApiMessage {
            role: Self::convert_message_role(&msg.role),
            content: msg.content.clone(),
        }
    }

    fn convert_finish_reason(reason: Option<String>) -> Option<FinishReason> {
        reason.map(|r| match r.as_str() {
            "length" => FinishReason::Length,
            "content_filter" => FinishReason::ContentFilter,
            _ => FinishReason::Stop,
        })
    }

    fn handle_http_error(err: reqwest::Error) -> ModelError {
        if err.is_timeout() {
            ModelError::ServiceUnavailable {
                message: "Request timeout".to_string(),
            }
        } else if err.is_connect() {
            ModelError::ServiceUnavailable {
                message: "Cannot connect to OpenAI service".to_string(),
            }
        } else {
            ModelError::Network(err)
        }
    }

    fn error_for_status(status: StatusCode, body: String, model: &str) -> ModelError {
        match status.as_u16() {
            401 | 403 => ModelError::Authentication,
            404 => ModelError::ModelNotFound {
                model: model.to_string(),
            },
            429 => ModelError::RateLimit,
            500..=599 => ModelError::ServiceUnavailable {
                message: format!("OpenAI API error ({}): {}", status, body),
            },
            _ => ModelError::Unknown {
                message: format!("OpenAI API error ({}): {}", status, body),
            },
        }
    }
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
    async fn chat(&self, request: ChatRequest) -> ModelResult<ChatResponse> {
        debug!("Starting chat request with model: {}", request.model);

        let api_messages: Vec<ApiMessage> = request
            .messages
            .iter()
            .map(Self::convert_message_to_api)
            .collect();

        let api_request = ApiChatRequest {
            model: request.model.clone(),
            messages: api_messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let url = format!("{}/v1/chat/completions", self.config.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&api_request)
            .send()
            .await
            .map_err(Self::handle_http_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(Self::error_for_status(status, error_text, &request.model));
        }

        let api_response: ApiChatResponse =
            response.json().await.map_err(Self::handle_http_error)?;

        let choices: Vec<Choice> = api_response
            .choices
            .into_iter()
            .map(|choice| Choice {
                message: ChatMessage::assistant(choice.message.content),
                finish_reason: Self::convert_finish_reason(choice.finish_reason),
            })
            .collect();

        let usage = api_response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        info!("Chat request completed successfully");

        Ok(ChatResponse { choices, usage })
    }

    async fn list_models(&self) -> ModelResult<Vec<ModelInfo>> {
        debug!("Listing available models");

        let url = format!("{}/v1/models", self.config.base_url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(Self::handle_http_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(Self::error_for_status(status, error_text, "unknown"));
        }

        let models_response: ApiModelsResponse =
            response.json().await.map_err(Self::handle_http_error)?;

        let model_infos: Vec<ModelInfo> = models_response
            .data
            .into_iter()
            .map(|model| ModelInfo {
                name: model.id,
                owned_by: model.owned_by,
            })
            .collect();

        info!("Retrieved {} models", model_infos.len());
        Ok(model_infos)
    }

    async fn health_check(&self) -> ModelResult<()> {
        debug!("Performing health check");

        // The OpenAI API has no dedicated health endpoint; a model listing
        // exercises auth and connectivity.
        let url = format!("{}/v1/models", self.config.base_url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(Self::handle_http_error)?;

        if response.status().is_success() {
            info!("Health check passed");
            Ok(())
        } else {
            error!("Health check failed with status: {}", response.status());
            Err(ModelError::ServiceUnavailable {
                message: format!("Health check failed: {}", response.status()),
            })
        }
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

#[async_trait]
impl SpeechTranscriber for OpenAiProvider {
    async fn transcribe(&self, audio: Vec<u8>, filename: &str) -> ModelResult<String> {
        debug!("Transcribing {} bytes from {}", audio.len(), filename);

        let url = format!("{}/v1/audio/transcriptions", self.config.base_url);

        let part = multipart::Part::bytes(audio)
            .file_name(filename.to_string())
            .mime_str("application/octet-stream")
            .map_err(|e| ModelError::Unknown {
                message: format!("Failed to build multipart body: {}", e),
            })?;

        let form = multipart::Form::new()
            .part("file", part)
            .text("model", self.config.transcription_model.clone());

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(Self::handle_http_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(Self::error_for_status(
                status,
                error_text,
                &self.config.transcription_model,
            ));
        }

        let transcription: ApiTranscription =
            response.json().await.map_err(Self::handle_http_error)?;

        info!("Transcription completed ({} chars)", transcription.text.len());
        Ok(transcription.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> OpenAiConfig {
        OpenAiConfig::new("sk-test")
    }

    #[tokio::test]
    async fn test_provider_creation() {
        let provider = OpenAiProvider::new(test_config());
        assert!(provider.is_ok());
        assert_eq!(provider.unwrap().provider_name(), "openai");
    }

    #[test]
    fn test_provider_rejects_invalid_config() {
        let mut config = test_config();
        config.api_key = String::new();
        assert!(OpenAiProvider::new(config).is_err());
    }

    #[test]
    fn test_message_conversion() {
        let system_msg = ChatMessage::system("You are helpful");
        let api_msg = OpenAiProvider::convert_message_to_api(&system_msg);
        assert_eq!(api_msg.role, "system");
        assert_eq!(api_msg.content, "You are helpful");

        let user_msg = ChatMessage::user("Hello");
        let api_msg = OpenAiProvider::convert_message_to_api(&user_msg);
        assert_eq!(api_msg.role, "user");
        assert_eq!(api_msg.content, "Hello");
    }

    #[test]
    fn test_finish_reason_conversion() {
        assert_eq!(
            OpenAiProvider::convert_finish_reason(Some("stop".to_string())),
            Some(FinishReason::Stop)
        );
        assert_eq!(
            OpenAiProvider::convert_finish_reason(Some("length".to_string())),
            Some(FinishReason::Length)
        );
        assert_eq!(
            OpenAiProvider::convert_finish_reason(Some("content_filter".to_string())),
            Some(FinishReason::ContentFilter)
        );
        assert_eq!(
            OpenAiProvider::convert_finish_reason(Some("unknown".to_string())),
            Some(FinishReason::Stop)
        );
        assert_eq!(OpenAiProvider::convert_finish_reason(None), None);
    }

    #[test]
    fn test_error_for_status() {
        assert!(matches!(
            OpenAiProvider::error_for_status(StatusCode::UNAUTHORIZED, String::new(), "m"),
            ModelError::Authentication
        ));
        assert!(matches!(
            OpenAiProvider::error_for_status(StatusCode::TOO_MANY_REQUESTS, String::new(), "m"),
            ModelError::RateLimit
        ));
        assert!(matches!(
            OpenAiProvider::error_for_status(StatusCode::NOT_FOUND, String::new(), "m"),
            ModelError::ModelNotFound { .. }
        ));
        assert!(matches!(
            OpenAiProvider::error_for_status(StatusCode::BAD_GATEWAY, String::new(), "m"),
            ModelError::ServiceUnavailable { .. }
        ));
    }
}
