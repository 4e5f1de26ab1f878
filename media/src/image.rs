use crate::{MediaError, MediaResult};
use async_trait::async_trait;
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    pub base_url: String,
    pub api_token: String,
    /// Model reference in `owner/name` form.
    pub model: String,
    pub timeout: Duration,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.replicate.com".to_string(),
            api_token: String::new(),
            model: "black-forest-labs/flux-schnell".to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

impl ImageConfig {
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            ..Self::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.base_url.is_empty() {
            return Err("Base URL cannot be empty".to_string());
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err("Base URL must start with http:// or https://".to_string());
        }

        if self.api_token.is_empty() {
            return Err("API token cannot be empty".to_string());
        }

        if !self.model.contains('/') {
            return Err("Model must be an owner/name reference".to_string());
        }

        if self.timeout.is_zero() {
            return Err("Timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}

/// Anything that can turn a text prompt into an image file on disk.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, output_dir: &Path, stem: &str)
        -> MediaResult<PathBuf>;
}

#[derive(Debug, Deserialize)]
struct PredictionResponse {
    status: String,
    #[serde(default)]
    output: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

pub struct ReplicateClient {
    client: reqwest::Client,
    config: ImageConfig,
}

impl ReplicateClient {
    pub fn new(config: ImageConfig) -> MediaResult<Self> {
        config
            .validate()
            .map_err(|msg| MediaError::InvalidConfig { message: msg })?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self { client, config })
    }

    /// Run the configured model synchronously (`Prefer: wait`) and return
    /// the raw image bytes.
    async fn run(&self, prompt: &str) -> MediaResult<Vec<u8>> {
        let url = format!(
            "{}/v1/models/{}/predictions",
            self.config.base_url, self.config.model
        );

        debug!("Running image model {}", self.config.model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_token)
            .header("Prefer", "wait")
            .json(&json!({ "input": { "prompt": prompt } }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MediaError::Service {
                message: format!("Replicate API error ({}): {}", status, body),
            });
        }

        let prediction: PredictionResponse = response.json().await?;

        if prediction.status == "failed" || prediction.status == "canceled" {
            let message = prediction.error.unwrap_or(prediction.status);
            error!("Image generation failed: {}", message);
            return Err(MediaError::GenerationFailed { status: message });
        }

        let output = prediction.output.ok_or(MediaError::MissingOutput)?;
        self.fetch_output(output).await
    }

    /// The model either returns a list of file URLs or a single URL.
    async fn fetch_output(&self, output: serde_json::Value) -> MediaResult<Vec<u8>> {
        let url = match &output {
            serde_json::Value::Array(items) => items
                .first()
                .and_then(|v| v.as_str())
                .ok_or(MediaError::MissingOutput)?,
            serde_json::Value::String(s) => s.as_str(),
            _ => return Err(MediaError::MissingOutput),
        };

        debug!("Downloading generated image from {}", url);
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(MediaError::Service {
                message: format!("Image download failed: {}", response.status()),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl ImageGenerator for ReplicateClient {
    async fn generate(
        &self,
        prompt: &str,
        output_dir: &Path,
        stem: &str,
    ) -> MediaResult<PathBuf> {
        let bytes = self.run(prompt).await?;
        let path = save_image(&bytes, output_dir, stem)?;
        info!("Image saved: {}", path.display());
        Ok(path)
    }
}

/// Write image bytes under `output_dir` as `<stem>_<timestamp>.<ext>`,
/// sniffing the extension from the content.
pub fn save_image(bytes: &[u8], output_dir: &Path, stem: &str) -> MediaResult<PathBuf> {
    std::fs::create_dir_all(output_dir)?;

    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let ext = sniff_image_ext(bytes);
    let path = output_dir.join(format!("{}_{}.{}", stem, timestamp, ext));

    std::fs::write(&path, bytes)?;
    Ok(path)
}

/// Guess the image format from magic bytes; jpg when unrecognized.
pub fn sniff_image_ext(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        "png"
    } else if bytes.starts_with(b"\xff\xd8\xff") {
        "jpg"
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        "gif"
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "webp"
    } else {
        "jpg"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        let config = ImageConfig::new("r8-token");
        assert!(config.validate().is_ok());

        let mut config = config;
        config.api_token = String::new();
        assert!(config.validate().is_err());

        config.api_token = "r8-token".to_string();
        config.model = "flux-schnell".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sniff_image_ext() {
        assert_eq!(sniff_image_ext(b"\x89PNG\r\n\x1a\nrest"), "png");
        assert_eq!(sniff_image_ext(b"\xff\xd8\xff\xe0rest"), "jpg");
        assert_eq!(sniff_image_ext(b"GIF89a-rest"), "gif");
        assert_eq!(sniff_image_ext(b"RIFF\x00\x00\x00\x00WEBPrest"), "webp");
        assert_eq!(sniff_image_ext(b"unknown"), "jpg");
    }

    #[test]
    fn test_save_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_image(b"\x89PNG\r\n\x1a\ndata", dir.path(), "director_photo").unwrap();

        assert!(path.exists());
        assert_eq!(path.extension().unwrap(), "png");
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("director_photo_"));
    }
}
