use crate::prompts;
use model::{ChatMessage, ChatRequest, ModelError, ModelProvider, ModelResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Threads longer than this get trimmed to the system prompt plus the
/// most recent tail.
const THREAD_LIMIT: usize = 20;
const THREAD_KEEP_TAIL: usize = 10;

/// Window digests over the chat log.
pub struct Summarizer {
    provider: Arc<dyn ModelProvider>,
    model: String,
}

impl Summarizer {
    pub fn new(provider: Arc<dyn ModelProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    async fn complete(
        &self,
        system_prompt: &str,
        user_content: String,
        temperature: f32,
        max_tokens: u32,
    ) -> ModelResult<String> {
        let request = ChatRequest::new(
            &self.model,
            vec![
                ChatMessage::system(system_prompt),
                ChatMessage::user(user_content),
            ],
        )
        .with_temperature(temperature)
        .with_max_tokens(max_tokens);

        let response = self.provider.chat(request).await?;
        response
            .first_content()
            .map(|s| s.to_string())
            .ok_or_else(|| ModelError::Unknown {
                message: "Model returned no choices".to_string(),
            })
    }

    /// Digest of a window described by `period` ("последние 24 часа",
    /// "2024-07-20", ...).
    pub async fn summarize(&self, messages: &str, period: &str) -> ModelResult<String> {
        debug!("Summarizing window: {}", period);
        self.complete(
            prompts::SUMMARY_PROMPT,
            format!("Вот сообщения чата за {}:\n\n{}", period, messages),
            0.8,
            2500,
        )
        .await
    }

    pub async fn summarize_recent(&self, messages: &str, hours: i64) -> ModelResult<String> {
        self.complete(
            prompts::RECENT_SUMMARY_PROMPT,
            format!(
                "Вот сообщения чата за последние {} часов:\n\n{}",
                hours, messages
            ),
            0.8,
            2000,
        )
        .await
    }

    /// Participant ranking for a window; the reply ends with the
    /// "Директор чата: ..." line the director-photo flow parses.
    pub async fn top(&self, messages: &str, period: &str) -> ModelResult<String> {
        debug!("Ranking participants for window: {}", period);
        self.complete(
            prompts::TOP_SUMMARY_PROMPT,
            format!("Вот сообщения чата за {}:\n\n{}", period, messages),
            0.7,
            2000,
        )
        .await
    }
}

/// Per-chat assistant conversations (`/q`, `?`-questions, auto-replies).
pub struct Assistant {
    provider: Arc<dyn ModelProvider>,
    model: String,
    threads: Mutex<HashMap<i64, Vec<ChatMessage>>>,
}

impl Assistant {
    pub fn new(provider: Arc<dyn ModelProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            threads: Mutex::new(HashMap::new()),
        }
    }

    pub async fn ask(&self, chat_id: i64, question: &str) -> ModelResult<String> {
        let messages = {
            let mut threads = self.threads.lock().await;
            let thread = threads
                .entry(chat_id)
                .or_insert_with(|| vec![ChatMessage::system(prompts::CHATGPT_PROMPT)]);
            thread.push(ChatMessage::user(question));
            thread.clone()
        };

        let request = ChatRequest::new(&self.model, messages)
            .with_temperature(0.7)
            .with_max_tokens(2500);

        let response = self.provider.chat(request).await?;
        let reply = response
            .first_content()
            .map(|s| s.to_string())
            .ok_or_else(|| ModelError::Unknown {
                message: "Model returned no choices".to_string(),
            })?;

        let mut threads = self.threads.lock().await;
        if let Some(thread) = threads.get_mut(&chat_id) {
            thread.push(ChatMessage::assistant(reply.clone()));
            trim_thread(thread);
        }

        Ok(reply)
    }

    pub async fn thread_count(&self) -> usize {
        self.threads.lock().await.len()
    }

    /// Trim every thread; runs after the daily digest to bound memory.
    pub async fn cleanup(&self) {
        let mut threads = self.threads.lock().await;
        for (chat_id, thread) in threads.iter_mut() {
            if thread.len() > THREAD_LIMIT {
                trim_thread(thread);
                info!("Trimmed assistant thread for chat {}", chat_id);
            }
        }
    }
}

fn trim_thread(thread: &mut Vec<ChatMessage>) {
    if thread.len() > THREAD_LIMIT {
        let tail_start = thread.len() - THREAD_KEEP_TAIL;
        let mut trimmed = Vec::with_capacity(1 + THREAD_KEEP_TAIL);
        trimmed.push(thread[0].clone());
        trimmed.extend_from_slice(&thread[tail_start..]);
        *thread = trimmed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use model::{ChatResponse, Choice, FinishReason, ModelInfo};

    struct EchoProvider;

    #[async_trait]
    impl ModelProvider for EchoProvider {
        async fn chat(&self, request: ChatRequest) -> ModelResult<ChatResponse> {
            let last = request
                .messages
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default();
            Ok(ChatResponse {
                choices: vec![Choice {
                    message: ChatMessage::assistant(format!("echo: {}", last)),
                    finish_reason: Some(FinishReason::Stop),
                }],
                usage: None,
            })
        }

        async fn list_models(&self) -> ModelResult<Vec<ModelInfo>> {
            Ok(vec![])
        }

        async fn health_check(&self) -> ModelResult<()> {
            Ok(())
        }

        fn provider_name(&self) -> &'static str {
            "echo"
        }
    }

    #[tokio::test]
    async fn test_summarize_includes_period() {
        let summarizer = Summarizer::new(Arc::new(EchoProvider), "test-model");
        let result = summarizer
            .summarize("Иван: привет", "последние 24 часа")
            .await
            .unwrap();
        assert!(result.contains("последние 24 часа"));
        assert!(result.contains("Иван: привет"));
    }

    #[tokio::test]
    async fn test_assistant_keeps_thread_per_chat() {
        let assistant = Assistant::new(Arc::new(EchoProvider), "test-model");

        let reply = assistant.ask(1, "как дела?").await.unwrap();
        assert_eq!(reply, "echo: как дела?");

        assistant.ask(2, "другой чат").await.unwrap();
        assert_eq!(assistant.thread_count().await, 2);
    }

    #[tokio::test]
    async fn test_thread_trimming() {
        let assistant = Assistant::new(Arc::new(EchoProvider), "test-model");

        for i in 0..15 {
            assistant.ask(1, &format!("вопрос {}", i)).await.unwrap();
        }

        let threads = assistant.threads.lock().await;
        let thread = threads.get(&1).unwrap();
        // System prompt survives, the rest is the recent tail.
        assert!(thread.len() <= THREAD_LIMIT);
        assert_eq!(thread[0].content, prompts::CHATGPT_PROMPT);
    }

    #[test]
    fn test_trim_thread_shape() {
        let mut thread = vec![ChatMessage::system("s")];
        for i in 0..24 {
            thread.push(ChatMessage::user(format!("m{}", i)));
        }

        trim_thread(&mut thread);

        assert_eq!(thread.len(), 1 + THREAD_KEEP_TAIL);
        assert_eq!(thread[0].content, "s");
        assert_eq!(thread.last().unwrap().content, "m23");
    }
}
