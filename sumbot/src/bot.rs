use crate::config::{BotConfig, ConfigError};
use crate::director;
use crate::song;
use crate::store::{MessageStore, StoreError, StoredMessage};
use crate::summarizer::{Assistant, Summarizer};
use crate::telegram::{
    InlineArticle, InlineQuery, Message, ReplyKeyboardMarkup, TelegramClient, TelegramError,
    Update,
};
use chrono::{FixedOffset, TimeZone, Utc};
use media::{MediaError, ReplicateClient, SunoClient};
use media::image::{ImageConfig, ImageGenerator};
use media::music::SunoConfig;
use model::{
    AnthropicConfig, AnthropicProvider, ChatMessage, ChatRequest, ModelError, ModelProvider,
    OpenAiConfig, OpenAiProvider, SpeechTranscriber,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const BTN_SUMMARY: &str = "📋 Итоги";
pub const BTN_TOP_DAY: &str = "🏆 Топ дня";
pub const BTN_TOP_WEEK: &str = "📅 Топ 7д";
pub const BTN_RECENT: &str = "🤔 Че у вас тут происходит";
pub const BTN_GIFT: &str = "🎁 Подарок";
pub const BTN_SONG: &str = "🎵 Песня дня";
pub const BTN_ORDER_SONG: &str = "🎶 Заказать песню";

const LONG_POLL_SECS: u64 = 30;

#[derive(Error, Debug)]
pub enum BotError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Telegram(#[from] TelegramError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type BotResult<T> = Result<T, BotError>;

pub fn main_keyboard() -> ReplyKeyboardMarkup {
    ReplyKeyboardMarkup::from_rows(&[
        &[BTN_SUMMARY, BTN_TOP_DAY, BTN_TOP_WEEK],
        &[BTN_RECENT],
        &[BTN_GIFT, BTN_SONG, BTN_ORDER_SONG],
    ])
}

/// All long-lived state behind the update loop.
pub struct BotApp {
    pub config: BotConfig,
    offset: FixedOffset,
    pub(crate) chat_model: String,
    pub telegram: TelegramClient,
    openai: Arc<OpenAiProvider>,
    pub(crate) provider: Arc<dyn ModelProvider>,
    anthropic: Option<AnthropicProvider>,
    pub(crate) replicate: Option<ReplicateClient>,
    pub suno: Option<SunoClient>,
    pub summarizer: Summarizer,
    pub assistant: Assistant,
    pub store: Mutex<MessageStore>,
    counters: Mutex<HashMap<i64, u64>>,
    pending_song_requests: Mutex<HashSet<i64>>,
    pub song_tasks: song::SongTaskQueue,
}

impl BotApp {
    pub fn new(config: BotConfig) -> BotResult<Self> {
        let offset = config.local_offset();

        let telegram = TelegramClient::new(&config.telegram_bot_token)?;

        let openai = Arc::new(OpenAiProvider::new(OpenAiConfig::new(
            &config.openai_api_key,
        ))?);
        let chat_model = openai.chat_model().to_string();
        let provider: Arc<dyn ModelProvider> = openai.clone();

        let anthropic = config
            .anthropic_api_key
            .as_ref()
            .map(|key| AnthropicProvider::new(AnthropicConfig::new(key)))
            .transpose()?;
        if anthropic.is_none() {
            warn!("ANTHROPIC_API_KEY not set, lyrics polishing disabled");
        }

        let replicate = config
            .replicate_api_token
            .as_ref()
            .map(|token| {
                ReplicateClient::new(
                    ImageConfig::new(token).with_model(&config.replicate_image_model),
                )
            })
            .transpose()?;
        if replicate.is_none() {
            warn!("REPLICATE_API_TOKEN not set, photo generation disabled");
        }

        let suno = config
            .suno_api_key
            .as_ref()
            .map(|key| SunoClient::new(SunoConfig::new(key)))
            .transpose()?;
        if suno.is_none() {
            warn!("SUNO_API_KEY not set, music generation disabled");
        }

        let store = MessageStore::load(&config.message_store_file, offset)?;

        let summarizer = Summarizer::new(provider.clone(), &chat_model);
        let assistant = Assistant::new(provider.clone(), &chat_model);

        Ok(Self {
            config,
            offset,
            chat_model,
            telegram,
            openai,
            provider,
            anthropic,
            replicate,
            suno,
            summarizer,
            assistant,
            store: Mutex::new(store),
            counters: Mutex::new(HashMap::new()),
            pending_song_requests: Mutex::new(HashSet::new()),
            song_tasks: song::SongTaskQueue::new(),
        })
    }

    pub fn local_offset(&self) -> FixedOffset {
        self.offset
    }

    /// Long-poll update loop. Returns when the process receives Ctrl-C;
    /// the store is flushed on the way out.
    pub async fn run(self: Arc<Self>) -> BotResult<()> {
        let me = self.telegram.get_me().await?;
        info!(
            "Bot @{} is online",
            me.username.as_deref().unwrap_or("unknown")
        );

        tokio::spawn(crate::scheduler::daily_digest_loop(self.clone()));
        tokio::spawn(crate::scheduler::song_poll_loop(self.clone()));

        let mut offset: Option<i64> = None;

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down, flushing message store");
                    self.store.lock().await.save_forced()?;
                    return Ok(());
                }
                updates = self.telegram.get_updates(offset, LONG_POLL_SECS) => {
                    match updates {
                        Ok(updates) => {
                            for update in updates {
                                offset = Some(update.update_id + 1);
                                if let Err(e) = self.handle_update(update).await {
                                    error!("Update handling failed: {}", e);
                                }
                            }
                        }
                        Err(e) => {
                            error!("getUpdates failed: {}", e);
                            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        }
                    }
                }
            }
        }
    }

    async fn handle_update(&self, update: Update) -> BotResult<()> {
        if let Some(message) = update.message {
            self.handle_message(message).await?;
        } else if let Some(query) = update.inline_query {
            self.handle_inline_query(query).await?;
        }
        Ok(())
    }

    async fn handle_message(&self, message: Message) -> BotResult<()> {
        let chat_id = message.chat.id;

        if let Some(text) = message.text.clone() {
            if message.via_bot.is_some() {
                return Ok(());
            }

            if self.take_pending_song_request(chat_id).await {
                return self.handle_song_order(chat_id, &text).await;
            }

            if self.is_keyboard_button(&text) {
                return self.handle_button(chat_id, &text).await;
            }

            if text.starts_with('/') {
                return self.handle_command(chat_id, &text).await;
            }

            if let Some(question) = text.strip_prefix('?') {
                let question = question.trim();
                if !question.is_empty() {
                    return self.handle_question(chat_id, question, true).await;
                }
            }

            self.store_text_message(&message, &text).await?;
            self.maybe_auto_respond(chat_id, &text).await;
        } else if message.voice.is_some() {
            self.handle_voice(&message).await?;
        }

        Ok(())
    }

    fn is_keyboard_button(&self, text: &str) -> bool {
        matches!(
            text,
            BTN_SUMMARY | BTN_TOP_DAY | BTN_TOP_WEEK | BTN_RECENT | BTN_GIFT | BTN_SONG
                | BTN_ORDER_SONG
        )
    }

    async fn handle_button(&self, chat_id: i64, text: &str) -> BotResult<()> {
        match text {
            BTN_SUMMARY => self.send_day_summary(chat_id).await,
            BTN_TOP_DAY => self.send_day_top(chat_id).await,
            BTN_TOP_WEEK => self.send_week_top(chat_id).await,
            BTN_RECENT => self.send_recent_summary(chat_id, 2).await,
            BTN_GIFT => self.handle_gift(chat_id).await,
            BTN_SONG => self.handle_song_of_day(chat_id).await,
            BTN_ORDER_SONG => {
                self.telegram
                    .send_message(
                        chat_id,
                        "🎶 Напишите тему или текст песни. Я создам текст и музыку (2-3 минуты).",
                    )
                    .await?;
                self.pending_song_requests.lock().await.insert(chat_id);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn handle_command(&self, chat_id: i64, text: &str) -> BotResult<()> {
        let mut parts = text.splitn(2, char::is_whitespace);
        let command = parts
            .next()
            .unwrap_or_default()
            .split('@')
            .next()
            .unwrap_or_default();
        let args = parts.next().unwrap_or("").trim();

        match command {
            "/start" => self.handle_start(chat_id).await,
            "/sum" => self.send_day_summary(chat_id).await,
            "/top" => self.send_day_top(chat_id).await,
            "/week" => self.send_week_top(chat_id).await,
            "/date" => self.handle_date_command(chat_id, args, false).await,
            "/topdate" => self.handle_date_command(chat_id, args, true).await,
            "/q" => {
                if args.is_empty() {
                    self.telegram
                        .send_message(
                            chat_id,
                            "❓ Введите вопрос после команды /q\n\nПример: <code>/q Как дела?</code>",
                        )
                        .await?;
                    Ok(())
                } else {
                    self.handle_question(chat_id, args, false).await
                }
            }
            "/photo" => self.handle_photo_command(chat_id, args).await,
            "/debug" => self.handle_debug(chat_id).await,
            _ => Ok(()),
        }
    }

    async fn handle_start(&self, chat_id: i64) -> BotResult<()> {
        let help = "АЛО!!!!!! Я бот для суммаризации чатов.\n\n\
            🎯 <b>Быстрые кнопки:</b>\n\
            📋 Итоги - суммаризация за сегодня\n\
            🏆 Топ дня - рейтинг участников\n\
            📅 Топ 7д - топ участников недели\n\
            🤔 Че у вас тут происходит - что происходило последние 2 часа\n\
            🎁 Подарок - подарок для директора чата\n\
            🎵 Песня дня - песня на основе событий чата\n\n\
            ⌨️ <b>Команды:</b>\n\
            /sum - итоги дня\n\
            /top - топ участников дня\n\
            /week - топ участников недели\n\
            /date YYYY-MM-DD - итоги за конкретную дату\n\
            /topdate YYYY-MM-DD - топ участников за дату\n\
            /q &lt;текст&gt; - вопрос ассистенту\n\
            /photo &lt;промпт&gt; - генерация фото\n\
            /debug - информация о чате\n\n\
            💡 <b>Примеры:</b>\n\
            /date 2024-07-20\n\
            /photo cute cat sitting on a chair\n\n\
            🔍 <b>Inline режим:</b>\n\
            Используйте day, week или /photo промпт в любом чате.";

        self.telegram
            .send_message_with_keyboard(chat_id, help, &main_keyboard())
            .await?;
        Ok(())
    }

    async fn send_day_summary(&self, chat_id: i64) -> BotResult<()> {
        let messages = self.store.lock().await.messages_last_hours(chat_id, 24);
        if messages.is_empty() {
            self.telegram
                .send_message(
                    chat_id,
                    "Нет сообщений для суммаризации за последние 24 часа.",
                )
                .await?;
            return Ok(());
        }

        match self.summarizer.summarize(&messages, "последние 24 часа").await {
            Ok(summary) => {
                self.telegram
                    .safe_send(
                        chat_id,
                        &format!("📋 <b>Итоги за последние 24 часа:</b>\n\n{}", summary),
                    )
                    .await?;
            }
            Err(e) => {
                error!("Summary failed: {}", e);
                self.telegram
                    .send_message(
                        chat_id,
                        "Произошла ошибка при создании суммаризации. Попробуйте позже.",
                    )
                    .await?;
            }
        }
        Ok(())
    }

    async fn send_day_top(&self, chat_id: i64) -> BotResult<()> {
        let messages = self.store.lock().await.messages_last_hours(chat_id, 24);
        if messages.is_empty() {
            self.telegram
                .send_message(chat_id, "Нет сообщений за последние 24 часа.")
                .await?;
            return Ok(());
        }

        match self.summarizer.top(&messages, "последние 24 часа").await {
            Ok(top) => {
                self.telegram
                    .safe_send(
                        chat_id,
                        &format!("🏆 <b>Топ участников за последние 24 часа:</b>\n\n{}", top),
                    )
                    .await?;
                self.maybe_send_director_photo(chat_id, &top).await;
            }
            Err(e) => {
                error!("Top ranking failed: {}", e);
                self.telegram
                    .send_message(
                        chat_id,
                        "Произошла ошибка при создании топа участников за последние 24 часа.",
                    )
                    .await?;
            }
        }
        Ok(())
    }

    async fn send_week_top(&self, chat_id: i64) -> BotResult<()> {
        let messages = self.store.lock().await.messages_last_days(chat_id, 7);
        if messages.is_empty() {
            self.telegram
                .send_message(chat_id, "Нет сообщений за 7 дней.")
                .await?;
            return Ok(());
        }

        match self.summarizer.top(&messages, "7 дней").await {
            Ok(top) => {
                self.telegram
                    .safe_send(chat_id, &format!("📅 <b>Топ участников недели:</b>\n\n{}", top))
                    .await?;
            }
            Err(e) => {
                error!("Weekly top failed: {}", e);
                self.telegram
                    .send_message(
                        chat_id,
                        "Произошла ошибка при создании топа участников за 7 дней.",
                    )
                    .await?;
            }
        }
        Ok(())
    }

    async fn send_recent_summary(&self, chat_id: i64, hours: i64) -> BotResult<()> {
        let messages = self.store.lock().await.messages_last_hours(chat_id, hours);
        if messages.is_empty() {
            self.telegram
                .send_message(
                    chat_id,
                    &format!("Нет сообщений за последние {} часов.", hours),
                )
                .await?;
            return Ok(());
        }

        match self.summarizer.summarize_recent(&messages, hours).await {
            Ok(summary) => {
                self.telegram
                    .safe_send(
                        chat_id,
                        &format!(
                            "🤔 <b>Что происходило последние {} часа:</b>\n\n{}",
                            hours, summary
                        ),
                    )
                    .await?;
            }
            Err(e) => {
                error!("Recent summary failed: {}", e);
                self.telegram
                    .send_message(
                        chat_id,
                        "Произошла ошибка при создании суммаризации. Попробуйте позже.",
                    )
                    .await?;
            }
        }
        Ok(())
    }

    async fn handle_date_command(&self, chat_id: i64, args: &str, top: bool) -> BotResult<()> {
        if args.is_empty() {
            let example = if top { "/topdate" } else { "/date" };
            self.telegram
                .send_message(
                    chat_id,
                    &format!(
                        "📅 Укажите дату в формате YYYY-MM-DD\n\nПример: <code>{} 2024-07-20</code>",
                        example
                    ),
                )
                .await?;
            return Ok(());
        }

        let messages = match self.store.lock().await.messages_for_date(chat_id, args) {
            Ok(messages) => messages,
            Err(StoreError::InvalidDate { .. }) => {
                self.telegram
                    .send_message(
                        chat_id,
                        "❌ Неправильный формат даты. Используйте: YYYY-MM-DD (например: 2024-07-20)",
                    )
                    .await?;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        if messages.is_empty() {
            self.telegram
                .send_message(chat_id, &format!("Нет сообщений за {}.", args))
                .await?;
            return Ok(());
        }

        if top {
            match self.summarizer.top(&messages, args).await {
                Ok(result) => {
                    self.telegram
                        .safe_send(
                            chat_id,
                            &format!("🏆 <b>Топ участников за {}:</b>\n\n{}", args, result),
                        )
                        .await?;
                    self.maybe_send_director_photo(chat_id, &result).await;
                }
                Err(e) => {
                    error!("Top for date failed: {}", e);
                    self.telegram
                        .send_message(
                            chat_id,
                            &format!("Произошла ошибка при создании топа участников за {}.", args),
                        )
                        .await?;
                }
            }
        } else {
            match self.summarizer.summarize(&messages, args).await {
                Ok(result) => {
                    self.telegram
                        .safe_send(chat_id, &format!("📋 <b>Итоги за {}:</b>\n\n{}", args, result))
                        .await?;
                }
                Err(e) => {
                    error!("Summary for date failed: {}", e);
                    self.telegram
                        .send_message(
                            chat_id,
                            "Произошла ошибка при создании суммаризации. Попробуйте позже.",
                        )
                        .await?;
                }
            }
        }
        Ok(())
    }

    async fn handle_question(&self, chat_id: i64, question: &str, prefixed: bool) -> BotResult<()> {
        match self.assistant.ask(chat_id, question).await {
            Ok(reply) => {
                let text = if prefixed {
                    format!("🤖 {}", reply)
                } else {
                    reply
                };
                self.telegram.send_message_plain(chat_id, &text).await?;
            }
            Err(e) => {
                error!("Assistant query failed: {}", e);
                self.telegram
                    .send_message(chat_id, "❌ Ошибка при обработке запроса. Попробуйте позже.")
                    .await?;
            }
        }
        Ok(())
    }

    async fn store_text_message(&self, message: &Message, text: &str) -> BotResult<()> {
        let timestamp = Utc
            .timestamp_opt(message.date, 0)
            .single()
            .unwrap_or_else(Utc::now)
            .with_timezone(&self.offset);

        let mut store = self.store.lock().await;
        store.record(
            message.chat.id,
            message.message_id,
            StoredMessage {
                sender: message.sender_name(),
                text: text.to_string(),
                timestamp,
            },
        );
        if let Err(e) = store.save() {
            error!("Failed to save message store: {}", e);
        }
        Ok(())
    }

    async fn maybe_auto_respond(&self, chat_id: i64, text: &str) {
        let interval = self.config.auto_response_interval;
        if interval == 0 {
            return;
        }

        let count = {
            let mut counters = self.counters.lock().await;
            let counter = counters.entry(chat_id).or_insert(0);
            *counter += 1;
            *counter
        };

        if count % interval != 0 {
            return;
        }

        info!("Auto-responding to message {} in chat {}", count, chat_id);
        match self.assistant.ask(chat_id, text).await {
            Ok(reply) => {
                if let Err(e) = self
                    .telegram
                    .send_message_plain(chat_id, &format!("🤖 {}", reply))
                    .await
                {
                    error!("Failed to send auto-response: {}", e);
                }
            }
            Err(e) => {
                error!("Auto-response failed: {}", e);
                let _ = self
                    .telegram
                    .send_message(chat_id, "❌ Ошибка при автоматической обработке сообщения.")
                    .await;
            }
        }
    }

    async fn handle_voice(&self, message: &Message) -> BotResult<()> {
        let Some(voice) = &message.voice else {
            return Ok(());
        };

        let file = self.telegram.get_file(&voice.file_id).await?;
        let Some(file_path) = file.file_path else {
            warn!("Voice file {} has no path", voice.file_id);
            return Ok(());
        };

        let audio = self.telegram.download_file(&file_path).await?;
        let transcript = self.openai.transcribe(audio, "voice.oga").await?;

        self.store_text_message(message, &format!("[Голосовое]: {}", transcript))
            .await
    }

    async fn handle_debug(&self, chat_id: i64) -> BotResult<()> {
        let (stats, now) = {
            let store = self.store.lock().await;
            (store.stats(chat_id), store.now())
        };
        let counter = *self.counters.lock().await.get(&chat_id).unwrap_or(&0);
        let interval = self.config.auto_response_interval;

        let mut info = String::from("📊 <b>Статистика чата</b>\n\n");
        info.push_str(&format!(
            "Количество сообщений: <code>{}</code>\n",
            stats.message_count
        ));
        if let Some(oldest) = stats.oldest {
            info.push_str(&format!(
                "Старейшее: <code>{}</code>\n",
                oldest.format("%d.%m.%Y %H:%M")
            ));
        }
        if let Some(newest) = stats.newest {
            info.push_str(&format!(
                "Новейшее: <code>{}</code>\n",
                newest.format("%d.%m.%Y %H:%M")
            ));
        }
        info.push_str(&format!("Сейчас: <code>{}</code>\n", now.format("%d.%m.%Y %H:%M")));
        info.push_str(&format!(
            "Активных тредов: <code>{}</code>\n",
            self.assistant.thread_count().await
        ));
        info.push_str(&format!("Счетчик сообщений: <code>{}</code>\n", counter));
        if interval > 0 {
            let next = interval - (counter % interval);
            info.push_str(&format!("Следующий автоответ: <code>{}</code>", next));
        } else {
            info.push_str("Автоответы: <code>отключены</code>");
        }

        self.telegram.send_message(chat_id, &info).await?;
        Ok(())
    }

    async fn take_pending_song_request(&self, chat_id: i64) -> bool {
        self.pending_song_requests.lock().await.remove(&chat_id)
    }

    async fn maybe_send_director_photo(&self, chat_id: i64, top_text: &str) {
        let Some(replicate) = &self.replicate else {
            return;
        };

        let photo = director::generate_director_photo(
            &self.provider,
            &self.chat_model,
            replicate,
            top_text,
            &self.config.output_dir,
        )
        .await;

        if let Some(path) = photo {
            match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    let filename = path
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_else(|| "director.jpg".to_string());
                    if let Err(e) = self
                        .telegram
                        .send_photo(
                            chat_id,
                            bytes,
                            &filename,
                            "📸 <b>ФОТО ДИРЕКТОРА ЧАТА</b> 📸",
                        )
                        .await
                    {
                        error!("Failed to send director photo: {}", e);
                    }
                }
                Err(e) => error!("Failed to read generated photo: {}", e),
            }
        }
    }

    pub async fn handle_gift(&self, chat_id: i64) -> BotResult<()> {
        let status = self
            .telegram
            .send_message_plain(chat_id, "🎁 Анализирую директора и создаю подарок...")
            .await?;

        let result = self.run_gift_flow(chat_id).await;

        if let Err(e) = self.telegram.delete_message(chat_id, status.message_id).await {
            warn!("Failed to delete status message: {}", e);
        }

        result
    }

    pub(crate) async fn run_gift_flow(&self, chat_id: i64) -> BotResult<()> {
        let messages = self.store.lock().await.messages_last_hours(chat_id, 24);
        if messages.is_empty() {
            self.telegram
                .send_message(
                    chat_id,
                    "❌ Не удалось проанализировать директора чата. Возможно, недостаточно \
                     сообщений за последние 24 часа.",
                )
                .await?;
            return Ok(());
        }

        let gift = match director::analyze_director(&self.provider, &self.chat_model, &messages)
            .await
        {
            Ok(gift) => gift,
            Err(e) => {
                error!("Gift analysis failed: {}", e);
                self.telegram
                    .send_message(
                        chat_id,
                        "❌ Произошла ошибка при создании подарка. Попробуйте позже.",
                    )
                    .await?;
                return Ok(());
            }
        };

        self.telegram
            .safe_send(chat_id, &director::format_gift_message(&gift))
            .await?;

        if let Some(replicate) = &self.replicate {
            if !gift.gift_photo_prompt.is_empty() {
                match replicate
                    .generate(&gift.gift_photo_prompt, &self.config.output_dir, "gift_photo")
                    .await
                {
                    Ok(path) => {
                        if let Ok(bytes) = tokio::fs::read(&path).await {
                            let caption = format!(
                                "📸 <b>ФОТО ПОДАРКА ДЛЯ: {}</b> 📸",
                                gift.director_name
                            );
                            if let Err(e) = self
                                .telegram
                                .send_photo(chat_id, bytes, "gift.jpg", &caption)
                                .await
                            {
                                error!("Failed to send gift photo: {}", e);
                            }
                        }
                    }
                    Err(e) => {
                        error!("Gift photo generation failed: {}", e);
                        self.telegram
                            .send_message(chat_id, "❌ Не удалось сгенерировать фото подарка.")
                            .await?;
                    }
                }
            }
        }

        Ok(())
    }

    pub async fn handle_song_of_day(&self, chat_id: i64) -> BotResult<()> {
        let status = self
            .telegram
            .send_message_plain(chat_id, "🎵 Анализирую чат и создаю песню...")
            .await?;

        let result = self.run_song_flow(chat_id).await;

        if let Err(e) = self.telegram.delete_message(chat_id, status.message_id).await {
            warn!("Failed to delete status message: {}", e);
        }

        result
    }

    async fn run_song_flow(&self, chat_id: i64) -> BotResult<()> {
        let messages = self.store.lock().await.messages_last_hours(chat_id, 24);
        if messages.is_empty() {
            self.telegram
                .send_message(
                    chat_id,
                    "❌ Не удалось создать песню. Возможно, недостаточно сообщений за \
                     последние 24 часа.",
                )
                .await?;
            return Ok(());
        }

        let composed = song::compose_from_chat(&self.provider, &self.chat_model, &messages).await;
        let song_data = match composed {
            Ok(song_data) => song_data,
            Err(e) => {
                error!("Song composition failed: {}", e);
                self.telegram
                    .send_message(
                        chat_id,
                        "❌ Произошла ошибка при создании песни. Попробуйте позже.",
                    )
                    .await?;
                return Ok(());
            }
        };

        self.telegram
            .safe_send(chat_id, &song::format_song_message(&song_data))
            .await?;

        if !song_data.lyrics.is_empty() {
            self.submit_music_generation(chat_id, song_data, "🎼 Я уже у микрофона, все будет готово через 3 минуты...")
                .await?;
        }

        Ok(())
    }

    async fn handle_song_order(&self, chat_id: i64, request_text: &str) -> BotResult<()> {
        self.telegram
            .send_message_plain(chat_id, "🎼 Создаю текст и запускаю генерацию музыки...")
            .await?;

        let composed =
            song::compose_from_request(&self.provider, &self.chat_model, request_text).await;
        let song_data = match composed {
            Ok(song_data) => song_data,
            Err(e) => {
                error!("Requested song composition failed: {}", e);
                self.telegram
                    .send_message(chat_id, "❌ Не удалось создать песню по вашему запросу.")
                    .await?;
                return Ok(());
            }
        };

        self.telegram
            .safe_send(chat_id, &song::format_song_message(&song_data))
            .await?;

        self.submit_music_generation(
            chat_id,
            song_data,
            "⏳ Музыка будет готова примерно через 2-3 минуты. Я пришлю ссылки автоматически.",
        )
        .await
    }

    async fn submit_music_generation(
        &self,
        chat_id: i64,
        song_data: song::Song,
        pending_text: &str,
    ) -> BotResult<()> {
        let Some(suno) = &self.suno else {
            self.telegram
                .send_message(chat_id, "❌ Генератор музыки недоступен")
                .await?;
            return Ok(());
        };

        let polished = song::polish_lyrics(self.anthropic.as_ref(), &song_data.lyrics).await;
        let mut spec = song_data.to_spec();
        spec.lyrics = polished;

        match suno.generate(&spec).await {
            Ok(task_id) => {
                self.song_tasks
                    .push(task_id, chat_id, song_data, song::INITIAL_CHECK_DELAY)
                    .await;
                self.telegram.send_message_plain(chat_id, pending_text).await?;
            }
            Err(e) => {
                error!("Music generation submit failed: {}", e);
                self.telegram
                    .send_message(chat_id, "❌ Не удалось отправить задачу в Suno.")
                    .await?;
            }
        }

        Ok(())
    }

    async fn handle_photo_command(&self, chat_id: i64, prompt: &str) -> BotResult<()> {
        let Some(replicate) = &self.replicate else {
            self.telegram
                .send_message(chat_id, "❌ Генератор фото недоступен")
                .await?;
            return Ok(());
        };

        if prompt.is_empty() {
            self.telegram
                .send_message(
                    chat_id,
                    "🖼️ Введите промпт после команды /photo\n\n\
                     Пример: <code>/photo cute cat sitting on a chair</code>",
                )
                .await?;
            return Ok(());
        }

        let status = self
            .telegram
            .send_message_plain(chat_id, "🎨 Генерирую фото...")
            .await?;

        let enhanced = self.enhance_photo_prompt(prompt).await;
        let generated = replicate
            .generate(&enhanced, &self.config.output_dir, "generated_photo")
            .await;

        if let Err(e) = self.telegram.delete_message(chat_id, status.message_id).await {
            warn!("Failed to delete status message: {}", e);
        }

        match generated {
            Ok(path) => {
                let bytes = tokio::fs::read(&path).await?;
                self.telegram
                    .send_photo(
                        chat_id,
                        bytes,
                        "photo.jpg",
                        &format!("🖼️ Сгенерированное фото по запросу: {}", prompt),
                    )
                    .await?;
            }
            Err(e) => {
                error!("Photo generation failed: {}", e);
                self.telegram
                    .send_message(
                        chat_id,
                        "❌ Не удалось сгенерировать фото. Попробуйте другой промпт.",
                    )
                    .await?;
            }
        }

        Ok(())
    }

    /// Add quality details to a user photo prompt; model failures degrade
    /// to a static suffix.
    async fn enhance_photo_prompt(&self, prompt: &str) -> String {
        let request = ChatRequest::new(
            &self.chat_model,
            vec![
                ChatMessage::system(crate::prompts::PHOTO_ENHANCE_PROMPT),
                ChatMessage::user(format!(
                    "Улучши этот промпт для генерации изображения: {}",
                    prompt
                )),
            ],
        )
        .with_temperature(0.3)
        .with_max_tokens(200);

        match self.provider.chat(request).await {
            Ok(response) => match response.first_content() {
                Some(enhanced) if !enhanced.trim().is_empty() => enhanced.trim().to_string(),
                _ => fallback_photo_prompt(prompt),
            },
            Err(e) => {
                warn!("Prompt enhancement failed: {}", e);
                fallback_photo_prompt(prompt)
            }
        }
    }

    async fn handle_inline_query(&self, query: InlineQuery) -> BotResult<()> {
        let text = query.query.trim();

        if let Some(prompt) = text.strip_prefix("/photo ") {
            let prompt = prompt.trim();
            if self.replicate.is_none() {
                let article =
                    InlineArticle::new("error", "Ошибка", "Генератор фото недоступен");
                self.telegram
                    .answer_inline_query(&query.id, &[article], 0)
                    .await?;
                return Ok(());
            }
            if prompt.is_empty() {
                let article = InlineArticle::new(
                    "help",
                    "Помощь",
                    "Используйте: /photo ваш промпт\n\nПример: /photo cute cat",
                );
                self.telegram
                    .answer_inline_query(&query.id, &[article], 300)
                    .await?;
                return Ok(());
            }

            let article = InlineArticle::new(
                Uuid::new_v4().to_string(),
                format!("Фото: {}", truncate_title(prompt)),
                format!("🖼️ Сгенерированное фото по запросу: {}", prompt),
            );
            self.telegram
                .answer_inline_query(&query.id, &[article], 0)
                .await?;
            return Ok(());
        }

        let lower = text.to_lowercase();
        if lower != "day" && lower != "week" {
            let article = InlineArticle::new(
                "help",
                "Доступные команды",
                "Используйте: day (итоги дня), week (итоги недели) или /photo промпт \
                 (генерация фото)",
            );
            self.telegram
                .answer_inline_query(&query.id, &[article], 300)
                .await?;
            return Ok(());
        }

        // Inline queries carry no chat context; the caller's private log
        // is the best available window.
        let chat_id = query.from.id;
        let (messages, title, period) = if lower == "day" {
            let messages = self.store.lock().await.messages_last_hours(chat_id, 24);
            (messages, "Итоги дня", "последние 24 часа")
        } else {
            let messages = self.store.lock().await.messages_last_days(chat_id, 7);
            (messages, "Итоги недели", "7 дней")
        };

        let content = if messages.is_empty() {
            format!("Нет сообщений для суммаризации за {}.", period)
        } else {
            match self.summarizer.summarize(&messages, period).await {
                Ok(summary) => summary,
                Err(e) => {
                    error!("Inline summary failed: {}", e);
                    "Произошла ошибка при обработке запроса. Попробуйте позже.".to_string()
                }
            }
        };

        let article = InlineArticle::new(Uuid::new_v4().to_string(), title, content);
        self.telegram
            .answer_inline_query(&query.id, &[article], 0)
            .await?;
        Ok(())
    }
}

fn fallback_photo_prompt(prompt: &str) -> String {
    format!("{}, high quality, detailed, realistic, 8k resolution", prompt)
}

fn truncate_title(prompt: &str) -> String {
    let truncated: String = prompt.chars().take(30).collect();
    if truncated.len() < prompt.len() {
        format!("{}...", truncated)
    } else {
        truncated
    }
}
