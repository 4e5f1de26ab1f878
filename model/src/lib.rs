pub mod anthropic;
pub mod config;
pub mod extract;
pub mod openai;
pub mod provider;
pub mod types;

pub use anthropic::AnthropicProvider;
pub use config::{AnthropicConfig, OpenAiConfig};
pub use extract::extract_json;
pub use openai::OpenAiProvider;
pub use provider::{ModelError, ModelProvider, ModelResult, SpeechTranscriber};
pub use types::{
    ChatMessage, ChatRequest, ChatResponse, Choice, FinishReason, MessageRole, ModelInfo, Usage,
};

pub mod prelude {
    pub use crate::anthropic::*;
    pub use crate::config::*;
    pub use crate::extract::*;
    pub use crate::openai::*;
    pub use crate::provider::*;
    pub use crate::types::*;
}
