use chrono::FixedOffset;
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "Configuration file {path} not found. Create it with TELEGRAM_BOT_TOKEN and \
         OPENAI_API_KEY entries (KEY=VALUE lines, # comments allowed)"
    )]
    MissingEnvFile { path: String },

    #[error("Required environment variable {name} is not set or empty. Add it to the configuration file")]
    MissingVar { name: String },

    #[error("Invalid value for {name}: {message}")]
    InvalidVar { name: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Runtime configuration, assembled from the process environment after the
/// `.env` file is applied.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub telegram_bot_token: String,
    pub openai_api_key: String,
    pub anthropic_api_key: Option<String>,
    pub suno_api_key: Option<String>,
    pub replicate_api_token: Option<String>,
    pub replicate_image_model: String,
    /// Wall-clock offset for all window math; the deployment pins its chat
    /// timezone rather than following the host clock.
    pub utc_offset_hours: i32,
    pub message_store_file: PathBuf,
    pub output_dir: PathBuf,
    /// Every Nth stored message gets an automatic assistant reply; 0 turns
    /// the feature off.
    pub auto_response_interval: u64,
    pub daily_digest_hour: u32,
    pub daily_digest_minute: u32,
}

impl BotConfig {
    /// Preflight: require the env file, apply it, then read and validate
    /// the environment. Variables already exported win over file entries.
    pub fn load(env_file: &Path) -> ConfigResult<Self> {
        if !env_file.exists() {
            return Err(ConfigError::MissingEnvFile {
                path: env_file.display().to_string(),
            });
        }

        dotenvy::from_path(env_file).map_err(|e| ConfigError::InvalidVar {
            name: env_file.display().to_string(),
            message: e.to_string(),
        })?;
        debug!("Applied environment file {}", env_file.display());

        Self::from_env()
    }

    /// Read configuration from the already-populated process environment.
    pub fn from_env() -> ConfigResult<Self> {
        let config = Self {
            telegram_bot_token: required_var("TELEGRAM_BOT_TOKEN")?,
            openai_api_key: required_var("OPENAI_API_KEY")?,
            anthropic_api_key: optional_var("ANTHROPIC_API_KEY"),
            suno_api_key: optional_var("SUNO_API_KEY"),
            replicate_api_token: optional_var("REPLICATE_API_TOKEN"),
            replicate_image_model: optional_var("REPLICATE_IMAGE_MODEL")
                .unwrap_or_else(|| "black-forest-labs/flux-schnell".to_string()),
            utc_offset_hours: parsed_var("UTC_OFFSET_HOURS", 3)?,
            message_store_file: optional_var("MESSAGE_STORE_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("message_store.json")),
            output_dir: optional_var("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("generated_media")),
            auto_response_interval: parsed_var("AUTO_RESPONSE_INTERVAL", 20)?,
            daily_digest_hour: parsed_var("DAILY_DIGEST_HOUR", 23)?,
            daily_digest_minute: parsed_var("DAILY_DIGEST_MINUTE", 59)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if !(-14..=14).contains(&self.utc_offset_hours) {
            return Err(ConfigError::InvalidVar {
                name: "UTC_OFFSET_HOURS".to_string(),
                message: format!("{} is outside -14..=14", self.utc_offset_hours),
            });
        }

        if self.daily_digest_hour > 23 {
            return Err(ConfigError::InvalidVar {
                name: "DAILY_DIGEST_HOUR".to_string(),
                message: format!("{} is outside 0..=23", self.daily_digest_hour),
            });
        }

        if self.daily_digest_minute > 59 {
            return Err(ConfigError::InvalidVar {
                name: "DAILY_DIGEST_MINUTE".to_string(),
                message: format!("{} is outside 0..=59", self.daily_digest_minute),
            });
        }

        if self.replicate_image_model.is_empty() {
            return Err(ConfigError::InvalidVar {
                name: "REPLICATE_IMAGE_MODEL".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Create the media output directory; a no-op when it already exists.
    pub fn ensure_output_dir(&self) -> ConfigResult<()> {
        std::fs::create_dir_all(&self.output_dir)?;
        info!("Output directory ready: {}", self.output_dir.display());
        Ok(())
    }

    pub fn local_offset(&self) -> FixedOffset {
        // validate() keeps the hour count inside chrono's accepted range.
        FixedOffset::east_opt(self.utc_offset_hours * 3600)
            .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset is valid"))
    }
}

fn required_var(name: &str) -> ConfigResult<String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingVar {
            name: name.to_string(),
        }),
    }
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> ConfigResult<T>
where
    T::Err: std::fmt::Display,
{
    match optional_var(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e| ConfigError::InvalidVar {
            name: name.to_string(),
            message: format!("{}", e),
        }),
    }
}
