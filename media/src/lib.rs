pub mod image;
pub mod music;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Service error: {message}")]
    Service { message: String },

    #[error("Generation produced no output")]
    MissingOutput,

    #[error("Generation failed: {status}")]
    GenerationFailed { status: String },

    #[error("Timed out waiting for generation")]
    Timeout,
}

pub type MediaResult<T> = Result<T, MediaError>;

pub use image::{ImageConfig, ImageGenerator, ReplicateClient};
pub use music::{SongSpec, SunoClient, SunoConfig, SunoTrack, TaskRecord};
