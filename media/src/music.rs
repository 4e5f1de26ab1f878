use crate::{MediaError, MediaResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Task statuses the generation backend reports as unrecoverable.
const TERMINAL_FAILURES: [&str; 4] = [
    "CREATE_TASK_FAILED",
    "GENERATE_AUDIO_FAILED",
    "CALLBACK_EXCEPTION",
    "SENSITIVE_WORD_ERROR",
];

const MAX_PROMPT_CHARS: usize = 3000;
const MAX_TITLE_CHARS: usize = 80;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SunoConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
    pub model: String,
    /// The generate endpoint requires a callback URL even when the caller
    /// polls for status instead.
    pub callback_url: String,
    pub negative_tags: String,
}

impl Default for SunoConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.sunoapi.org".to_string(),
            api_key: String::new(),
            timeout: Duration::from_secs(60),
            model: "V4_5PLUS".to_string(),
            callback_url: "https://example.com/callback".to_string(),
            negative_tags: "Heavy Metal, Upbeat Drums".to_string(),
        }
    }
}

impl SunoConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
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

    pub fn validate(&self) -> Result<(), String> {
        if self.base_url.is_empty() {
            return Err("Base URL cannot be empty".to_string());
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err("Base URL must start with http:// or https://".to_string());
        }

        if self.api_key.is_empty() {
            return Err("API key cannot be empty".to_string());
        }

        if self.model.is_empty() {
            return Err("Model cannot be empty".to_string());
        }

        Ok(())
    }
}

/// What the caller wants sung.
#[derive(Debug, Clone)]
pub struct SongSpec {
    pub title: String,
    pub style: String,
    pub lyrics: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    prompt: String,
    style: String,
    title: String,
    custom_mode: bool,
    instrumental: bool,
    model: String,
    negative_tags: String,
    call_back_url: String,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateData {
    task_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub status: String,
    #[serde(default)]
    pub response: Option<TaskResponse>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResponse {
    #[serde(default)]
    pub suno_data: Vec<SunoTrack>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SunoTrack {
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

impl TaskRecord {
    pub fn is_success(&self) -> bool {
        self.status == "SUCCESS"
    }

    pub fn is_terminal_failure(&self) -> bool {
        TERMINAL_FAILURES.contains(&self.status.as_str())
    }

    pub fn tracks(&self) -> &[SunoTrack] {
        self.response
            .as_ref()
            .map(|r| r.suno_data.as_slice())
            .unwrap_or(&[])
    }
}

pub struct SunoClient {
    client: reqwest::Client,
    config: SunoConfig,
}

impl SunoClient {
    pub fn new(config: SunoConfig) -> MediaResult<Self> {
        config
            .validate()
            .map_err(|msg| MediaError::InvalidConfig { message: msg })?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self { client, config })
    }

    /// Submit a generation task; returns its task id.
    pub async fn generate(&self, spec: &SongSpec) -> MediaResult<String> {
        let request = GenerateRequest {
            prompt: truncate_chars(&spec.lyrics, MAX_PROMPT_CHARS),
            style: spec.style.clone(),
            title: truncate_chars(&spec.title, MAX_TITLE_CHARS),
            custom_mode: true,
            instrumental: false,
            model: self.config.model.clone(),
            negative_tags: self.config.negative_tags.clone(),
            call_back_url: self.config.callback_url.clone(),
        };

        let url = format!("{}/api/v1/generate", self.config.base_url);
        debug!("Submitting music generation task");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MediaError::Service {
                message: format!("Suno API error ({}): {}", status, body),
            });
        }

        let envelope: ApiEnvelope<GenerateData> = response.json().await?;

        if envelope.code != 200 {
            return Err(MediaError::Service {
                message: format!(
                    "Suno API rejected the task (code {}): {}",
                    envelope.code,
                    envelope.msg.unwrap_or_default()
                ),
            });
        }

        let task_id = envelope
            .data
            .map(|d| d.task_id)
            .ok_or(MediaError::MissingOutput)?;

        info!("Music generation task submitted: {}", task_id);
        Ok(task_id)
    }

    /// Fetch the current status of a task. `None` means the backend no
    /// longer knows the task (already completed and expired, or deleted).
    pub async fn task_status(&self, task_id: &str) -> MediaResult<Option<TaskRecord>> {
        let url = format!(
            "{}/api/v1/generate/record-info?taskId={}",
            self.config.base_url, task_id
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.config.api_key)
            .send()
            .await?;

        if response.status().as_u16() == 404 {
            warn!("Task {} not found", task_id);
            return Ok(None);
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MediaError::Service {
                message: format!("Suno API error ({}): {}", status, body),
            });
        }

        let envelope: ApiEnvelope<TaskRecord> = response.json().await?;

        if envelope.code != 200 {
            return Err(MediaError::Service {
                message: format!(
                    "Suno status error (code {}): {}",
                    envelope.code,
                    envelope.msg.unwrap_or_default()
                ),
            });
        }

        Ok(envelope.data)
    }

    /// Poll until the task succeeds, fails, or `max_wait` elapses.
    pub async fn wait_for_completion(
        &self,
        task_id: &str,
        max_wait: Duration,
    ) -> MediaResult<TaskRecord> {
        let deadline = tokio::time::Instant::now() + max_wait;

        loop {
            if let Some(record) = self.task_status(task_id).await? {
                if record.is_success() {
                    info!("Music generation finished for {}", task_id);
                    return Ok(record);
                }
                if record.is_terminal_failure() {
                    return Err(MediaError::GenerationFailed {
                        status: record.status,
                    });
                }
                debug!("Task {} still {}, waiting", task_id, record.status);
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(MediaError::Timeout);
            }

            tokio::time::sleep(Duration::from_secs(10)).await;
        }
    }

    /// Download a generated asset (audio or cover) as raw bytes.
    pub async fn download(&self, url: &str) -> MediaResult<Vec<u8>> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(MediaError::Service {
                message: format!("Asset download failed: {}", response.status()),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        assert!(SunoConfig::new("key").validate().is_ok());
        assert!(SunoConfig::default().validate().is_err());
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("привет", 4), "прив");
        assert_eq!(truncate_chars("short", 100), "short");
    }

    #[test]
    fn test_task_record_status_helpers() {
        let record = TaskRecord {
            status: "SUCCESS".to_string(),
            response: None,
        };
        assert!(record.is_success());
        assert!(!record.is_terminal_failure());

        let record = TaskRecord {
            status: "SENSITIVE_WORD_ERROR".to_string(),
            response: None,
        };
        assert!(!record.is_success());
        assert!(record.is_terminal_failure());

        let record = TaskRecord {
            status: "PENDING".to_string(),
            response: None,
        };
        assert!(!record.is_success());
        assert!(!record.is_terminal_failure());
    }

    #[tokio::test]
    async fn test_generate_submits_task() {
        use httpmock::prelude::*;

        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/v1/generate")
                .json_body_partial(r#"{"customMode": true, "model": "V4_5PLUS"}"#);
            then.status(200).json_body(serde_json::json!({
                "code": 200,
                "data": {"taskId": "task-123"}
            }));
        });

        let client =
            SunoClient::new(SunoConfig::new("key").with_base_url(server.base_url())).unwrap();
        let spec = SongSpec {
            title: "Песня дня".to_string(),
            style: "Pop".to_string(),
            lyrics: "Куплет\nПрипев".to_string(),
        };

        let task_id = client.generate(&spec).await.unwrap();
        mock.assert();
        assert_eq!(task_id, "task-123");
    }

    #[tokio::test]
    async fn test_wait_for_completion_success() {
        use httpmock::prelude::*;

        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET)
                .path("/api/v1/generate/record-info")
                .query_param("taskId", "task-123");
            then.status(200).json_body(serde_json::json!({
                "code": 200,
                "data": {
                    "status": "SUCCESS",
                    "response": {"sunoData": [{"audioUrl": "https://cdn/a.mp3"}]}
                }
            }));
        });

        let client =
            SunoClient::new(SunoConfig::new("key").with_base_url(server.base_url())).unwrap();
        let record = client
            .wait_for_completion("task-123", Duration::from_secs(30))
            .await
            .unwrap();

        assert!(record.is_success());
        assert_eq!(record.tracks().len(), 1);
    }

    #[tokio::test]
    async fn test_wait_for_completion_terminal_failure() {
        use httpmock::prelude::*;

        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/v1/generate/record-info");
            then.status(200).json_body(serde_json::json!({
                "code": 200,
                "data": {"status": "GENERATE_AUDIO_FAILED"}
            }));
        });

        let client =
            SunoClient::new(SunoConfig::new("key").with_base_url(server.base_url())).unwrap();
        let err = client
            .wait_for_completion("task-123", Duration::from_secs(30))
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::GenerationFailed { .. }));
    }

    #[test]
    fn test_task_record_parsing() {
        let json = r#"{
            "status": "SUCCESS",
            "response": {
                "sunoData": [
                    {"audioUrl": "https://cdn/a.mp3", "imageUrl": "https://cdn/a.jpg", "title": "Track"}
                ]
            }
        }"#;

        let record: TaskRecord = serde_json::from_str(json).unwrap();
        assert!(record.is_success());
        assert_eq!(record.tracks().len(), 1);
        assert_eq!(
            record.tracks()[0].audio_url.as_deref(),
            Some("https://cdn/a.mp3")
        );
    }
}
