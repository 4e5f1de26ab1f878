use crate::prompts;
use media::SongSpec;
use model::{
    extract_json, AnthropicProvider, ChatMessage, ChatRequest, ModelProvider, ModelResult,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

/// First status check lands after the backend's usual render time; the
/// later cadences depend on what the check found.
pub const INITIAL_CHECK_DELAY: Duration = Duration::from_secs(180);
pub const RETRY_PENDING: Duration = Duration::from_secs(30);
pub const RETRY_UNKNOWN: Duration = Duration::from_secs(60);
pub const RETRY_ERROR: Duration = Duration::from_secs(120);

fn unspecified() -> String {
    "Не указано".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Song {
    #[serde(default = "unspecified")]
    pub song_title: String,
    #[serde(default = "unspecified")]
    pub genre: String,
    #[serde(default = "unspecified")]
    pub mood: String,
    #[serde(default)]
    pub lyrics: String,
    #[serde(default = "unspecified")]
    pub description: String,
    #[serde(default)]
    pub main_characters: Vec<String>,
    #[serde(default)]
    pub key_events: Vec<String>,
    #[serde(default)]
    pub style_prompt: String,
}

impl Song {
    pub fn to_spec(&self) -> SongSpec {
        SongSpec {
            title: self.song_title.clone(),
            style: self.genre.clone(),
            lyrics: self.lyrics.clone(),
        }
    }
}

async fn compose(
    provider: &Arc<dyn ModelProvider>,
    model: &str,
    system_prompt: &str,
    user_content: String,
) -> ModelResult<Song> {
    let request = ChatRequest::new(
        model,
        vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user(user_content),
        ],
    )
    .with_temperature(0.9)
    .with_max_tokens(1500);

    let response = provider.chat(request).await?;
    let text = response.first_content().unwrap_or_default();
    let song: Song = extract_json(text)?;

    info!("Song composed: {}", song.song_title);
    Ok(song)
}

/// Song of the day, written from the last 24 hours of chat.
pub async fn compose_from_chat(
    provider: &Arc<dyn ModelProvider>,
    model: &str,
    messages: &str,
) -> ModelResult<Song> {
    compose(
        provider,
        model,
        prompts::SONG_PROMPT,
        format!("Вот сообщения чата за последние 24 часа:\n\n{}", messages),
    )
    .await
}

/// Song written to order from a user's free-form request.
pub async fn compose_from_request(
    provider: &Arc<dyn ModelProvider>,
    model: &str,
    request_text: &str,
) -> ModelResult<Song> {
    compose(
        provider,
        model,
        prompts::SONG_REQUEST_PROMPT,
        format!("Тема или текст песни от пользователя:\n\n{}", request_text),
    )
    .await
}

/// Run the lyrics through the polishing model. Any failure (or no
/// configured provider) keeps the draft as-is.
pub async fn polish_lyrics(anthropic: Option<&AnthropicProvider>, lyrics: &str) -> String {
    let Some(provider) = anthropic else {
        return lyrics.to_string();
    };

    match provider
        .complete(&prompts::lyrics_improvement_prompt(lyrics))
        .await
    {
        Ok(improved) => {
            info!("Lyrics polished ({} chars)", improved.len());
            improved
        }
        Err(e) => {
            warn!("Lyrics polishing failed, keeping draft: {}", e);
            lyrics.to_string()
        }
    }
}

pub fn format_song_message(song: &Song) -> String {
    format!(
        "🎵 <b>ПЕСНЯ ДНЯ</b> 🎵\n\n\
         🎼 <b>Название:</b> {}\n\
         🎭 <b>Жанр:</b> {}\n\
         😊 <b>Настроение:</b> {}\n\n\
         📝 <b>Описание событий:</b>\n{}\n\n\
         👥 <b>Главные герои:</b>\n{}\n\n\
         🎯 <b>Ключевые события:</b>\n{}\n\n\
         🎤 <b>Текст песни:</b>\n\n{}",
        song.song_title,
        song.genre,
        song.mood,
        song.description,
        song.main_characters.join(", "),
        song.key_events.join(", "),
        song.lyrics
    )
}

/// A submitted music-generation task awaiting delivery.
#[derive(Debug, Clone)]
pub struct PendingSongTask {
    pub task_id: String,
    pub chat_id: i64,
    pub song: Song,
    pub due: Instant,
}

/// Tasks the polling loop wakes up for. Handlers push, the scheduler
/// drains whatever is due and reschedules the rest.
#[derive(Default)]
pub struct SongTaskQueue {
    tasks: Mutex<Vec<PendingSongTask>>,
}

impl SongTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, task_id: String, chat_id: i64, song: Song, delay: Duration) {
        let mut tasks = self.tasks.lock().await;
        tasks.push(PendingSongTask {
            task_id,
            chat_id,
            song,
            due: Instant::now() + delay,
        });
    }

    pub async fn reschedule(&self, mut task: PendingSongTask, delay: Duration) {
        task.due = Instant::now() + delay;
        self.tasks.lock().await.push(task);
    }

    /// Remove and return every task whose check time has arrived.
    pub async fn take_due(&self) -> Vec<PendingSongTask> {
        let now = Instant::now();
        let mut tasks = self.tasks.lock().await;

        let mut due = Vec::new();
        let mut remaining = Vec::with_capacity(tasks.len());
        for task in tasks.drain(..) {
            if task.due <= now {
                due.push(task);
            } else {
                remaining.push(task);
            }
        }
        *tasks = remaining;

        due
    }

    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_song() -> Song {
        Song {
            song_title: "Чат в огне".to_string(),
            genre: "Pop".to_string(),
            mood: "Funny".to_string(),
            lyrics: "Куплет один\nПрипев".to_string(),
            description: "День споров".to_string(),
            main_characters: vec!["Иван".to_string(), "Петр".to_string()],
            key_events: vec!["спор о пицце".to_string()],
            style_prompt: "upbeat pop".to_string(),
        }
    }

    #[test]
    fn test_song_defaults_for_missing_fields() {
        let song: Song = serde_json::from_str(r#"{"song_title": "Тест"}"#).unwrap();
        assert_eq!(song.song_title, "Тест");
        assert_eq!(song.genre, "Не указано");
        assert!(song.lyrics.is_empty());
        assert!(song.main_characters.is_empty());
    }

    #[test]
    fn test_format_song_message() {
        let message = format_song_message(&sample_song());
        assert!(message.contains("🎼 <b>Название:</b> Чат в огне"));
        assert!(message.contains("Иван, Петр"));
        assert!(message.contains("Куплет один"));
    }

    #[test]
    fn test_song_to_spec() {
        let spec = sample_song().to_spec();
        assert_eq!(spec.title, "Чат в огне");
        assert_eq!(spec.style, "Pop");
    }

    #[tokio::test]
    async fn test_queue_due_tasks() {
        let queue = SongTaskQueue::new();
        queue
            .push("t1".to_string(), 1, sample_song(), Duration::from_secs(0))
            .await;
        queue
            .push("t2".to_string(), 2, sample_song(), Duration::from_secs(3600))
            .await;

        let due = queue.take_due().await;
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].task_id, "t1");
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn test_queue_reschedule() {
        let queue = SongTaskQueue::new();
        queue
            .push("t1".to_string(), 1, sample_song(), Duration::from_secs(0))
            .await;

        let mut due = queue.take_due().await;
        let task = due.pop().unwrap();
        queue.reschedule(task, Duration::from_secs(3600)).await;

        assert!(queue.take_due().await.is_empty());
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn test_polish_without_provider_keeps_lyrics() {
        let lyrics = "оригинальный текст";
        assert_eq!(polish_lyrics(None, lyrics).await, lyrics);
    }
}
