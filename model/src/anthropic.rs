use crate::config::AnthropicConfig;
use crate::provider::{ModelError, ModelResult};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone, Serialize)]
struct ApiRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ApiMessage>,
}

#[derive(Debug, Clone, Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiResponse {
    content: Vec<ApiContentBlock>,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

/// Client for the Anthropic Messages API. The bot uses it for a single
/// concern: polishing generated song lyrics.
pub struct AnthropicProvider {
    client: reqwest::Client,
    config: AnthropicConfig,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicConfig) -> ModelResult<Self> {
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

    fn handle_http_error(err: reqwest::Error) -> ModelError {
        if err.is_timeout() {
            ModelError::ServiceUnavailable {
                message: "Request timeout".to_string(),
            }
        } else if err.is_connect() {
            ModelError::ServiceUnavailable {
                message: "Cannot connect to Anthropic service".to_string(),
            }
        } else {
            ModelError::Network(err)
        }
    }

    /// Send a single user prompt and return the text of the reply.
    pub async fn complete(&self, prompt: &str) -> ModelResult<String> {
        debug!("Starting completion with model: {}", self.config.model);

        let request = ApiRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            messages: vec![ApiMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let url = format!("{}/v1/messages", self.config.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(Self::handle_http_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ModelError::Authentication,
                StatusCode::TOO_MANY_REQUESTS => ModelError::RateLimit,
                _ => ModelError::Unknown {
                    message: format!("Anthropic API error ({}): {}", status, error_text),
                },
            });
        }

        let api_response: ApiResponse = response.json().await.map_err(Self::handle_http_error)?;

        let text = api_response
            .content
            .iter()
            .find(|block| block.block_type == "text")
            .map(|block| block.text.trim().to_string())
            .unwrap_or_default();

        if text.is_empty() {
            warn!("Anthropic response contained no text block");
            return Err(ModelError::Unknown {
                message: "Empty completion".to_string(),
            });
        }

        info!("Completion finished ({} chars)", text.len());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_creation() {
        let provider = AnthropicProvider::new(AnthropicConfig::new("sk-ant-test"));
        assert!(provider.is_ok());
    }

    #[test]
    fn test_provider_rejects_empty_key() {
        let mut config = AnthropicConfig::default();
        config.api_key = String::new();
        assert!(AnthropicProvider::new(config).is_err());
    }
}
