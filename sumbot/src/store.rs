use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info, warn};

/// Disk writes happen on every Nth `save` call; chatty groups would
/// otherwise rewrite the file per message.
const SAVE_BATCH_SIZE: u32 = 10;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid date '{input}', expected YYYY-MM-DD")]
    InvalidDate { input: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub sender: String,
    pub text: String,
    pub timestamp: DateTime<FixedOffset>,
}

#[derive(Debug, Clone)]
pub struct ChatStats {
    pub message_count: usize,
    pub oldest: Option<DateTime<FixedOffset>>,
    pub newest: Option<DateTime<FixedOffset>>,
}

type ChatMap = HashMap<String, HashMap<String, StoredMessage>>;

/// Per-chat message log with JSON persistence.
pub struct MessageStore {
    path: PathBuf,
    offset: FixedOffset,
    chats: ChatMap,
    save_counter: u32,
}

impl MessageStore {
    /// Load the store from disk. A missing file starts empty; a corrupted
    /// file is quarantined as `<path>.backup_<timestamp>` and the store
    /// starts empty rather than refusing to boot.
    pub fn load(path: impl Into<PathBuf>, offset: FixedOffset) -> StoreResult<Self> {
        let path = path.into();

        let chats = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<ChatMap>(&raw) {
                Ok(chats) => {
                    info!("Loaded messages for {} chats", chats.len());
                    chats
                }
                Err(e) => {
                    error!("Message store is corrupted: {}", e);
                    let backup = format!(
                        "{}.backup_{}",
                        path.display(),
                        Utc::now().with_timezone(&offset).format("%Y%m%d_%H%M%S")
                    );
                    std::fs::rename(&path, &backup)?;
                    info!("Corrupted store moved to {}", backup);
                    ChatMap::new()
                }
            }
        } else {
            info!("Message store does not exist yet, starting empty");
            ChatMap::new()
        };

        Ok(Self {
            path,
            offset,
            chats,
            save_counter: 0,
        })
    }

    pub fn record(&mut self, chat_id: i64, message_id: i64, message: StoredMessage) {
        self.chats
            .entry(chat_id.to_string())
            .or_default()
            .insert(message_id.to_string(), message);
    }

    /// Batched save: a no-op until `SAVE_BATCH_SIZE` calls accumulate.
    /// Returns whether the file was written.
    pub fn save(&mut self) -> StoreResult<bool> {
        self.save_counter += 1;
        if self.save_counter < SAVE_BATCH_SIZE {
            return Ok(false);
        }
        self.save_forced()?;
        Ok(true)
    }

    /// Write the store to disk unconditionally, via a temp file in the
    /// same directory so the rename is atomic.
    pub fn save_forced(&mut self) -> StoreResult<()> {
        self.save_counter = 0;

        let tmp = self.path.with_extension("json.tmp");
        let payload = serde_json::to_string_pretty(&self.chats)?;

        if let Err(e) = std::fs::write(&tmp, payload).and_then(|_| std::fs::rename(&tmp, &self.path))
        {
            if tmp.exists() {
                let _ = std::fs::remove_file(&tmp);
            }
            return Err(e.into());
        }

        info!("Message store saved ({} chats)", self.chats.len());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn chat_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self
            .chats
            .keys()
            .filter_map(|k| k.parse().ok())
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }

    /// Messages from local midnight until now.
    pub fn messages_today(&self, chat_id: i64) -> String {
        let now = self.now();
        let midnight = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .and_then(|naive| naive.and_local_timezone(self.offset).single())
            .unwrap_or(now);
        self.messages_between(chat_id, midnight, now)
    }

    pub fn messages_last_hours(&self, chat_id: i64, hours: i64) -> String {
        let now = self.now();
        self.messages_between(chat_id, now - Duration::hours(hours), now)
    }

    pub fn messages_last_days(&self, chat_id: i64, days: i64) -> String {
        let now = self.now();
        self.messages_between(chat_id, now - Duration::days(days), now)
    }

    /// Messages for a whole calendar day given as `YYYY-MM-DD`.
    pub fn messages_for_date(&self, chat_id: i64, date: &str) -> StoreResult<String> {
        let day = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| {
            StoreError::InvalidDate {
                input: date.to_string(),
            }
        })?;

        let start = day
            .and_hms_opt(0, 0, 0)
            .and_then(|naive| naive.and_local_timezone(self.offset).single())
            .ok_or_else(|| StoreError::InvalidDate {
                input: date.to_string(),
            })?;
        let end = start + Duration::days(1) - Duration::seconds(1);

        Ok(self.messages_between(chat_id, start, end))
    }

    fn messages_between(
        &self,
        chat_id: i64,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) -> String {
        let Some(messages) = self.chats.get(&chat_id.to_string()) else {
            return String::new();
        };

        let mut relevant: Vec<&StoredMessage> = messages
            .values()
            .filter(|msg| msg.timestamp >= start && msg.timestamp <= end)
            .collect();
        relevant.sort_by_key(|msg| msg.timestamp);

        relevant
            .iter()
            .map(|msg| format!("{}: {}", msg.sender, msg.text))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn stats(&self, chat_id: i64) -> ChatStats {
        let messages = self.chats.get(&chat_id.to_string());
        let message_count = messages.map(|m| m.len()).unwrap_or(0);

        let oldest = messages
            .and_then(|m| m.values().map(|msg| msg.timestamp).min());
        let newest = messages
            .and_then(|m| m.values().map(|msg| msg.timestamp).max());

        ChatStats {
            message_count,
            oldest,
            newest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn offset() -> FixedOffset {
        FixedOffset::east_opt(3 * 3600).unwrap()
    }

    fn message(sender: &str, text: &str, hours_ago: i64) -> StoredMessage {
        StoredMessage {
            sender: sender.to_string(),
            text: text.to_string(),
            timestamp: Utc::now().with_timezone(&offset()) - Duration::hours(hours_ago),
        }
    }

    #[test]
    fn test_window_queries() {
        let dir = tempdir().unwrap();
        let mut store = MessageStore::load(dir.path().join("store.json"), offset()).unwrap();

        store.record(1, 10, message("Иван", "привет", 1));
        store.record(1, 11, message("Петр", "старое сообщение", 30));
        store.record(2, 12, message("Мария", "другой чат", 1));

        let recent = store.messages_last_hours(1, 24);
        assert!(recent.contains("Иван: привет"));
        assert!(!recent.contains("старое сообщение"));
        assert!(!recent.contains("Мария"));

        let week = store.messages_last_days(1, 7);
        assert!(week.contains("Иван: привет"));
        assert!(week.contains("Петр: старое сообщение"));

        assert!(store.messages_last_hours(99, 24).is_empty());
    }

    #[test]
    fn test_messages_sorted_by_time() {
        let dir = tempdir().unwrap();
        let mut store = MessageStore::load(dir.path().join("store.json"), offset()).unwrap();

        store.record(1, 2, message("B", "второе", 1));
        store.record(1, 1, message("A", "первое", 2));

        let text = store.messages_last_hours(1, 24);
        let first = text.find("первое").unwrap();
        let second = text.find("второе").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_invalid_date() {
        let dir = tempdir().unwrap();
        let store = MessageStore::load(dir.path().join("store.json"), offset()).unwrap();

        let err = store.messages_for_date(1, "20-07-2024").unwrap_err();
        assert!(matches!(err, StoreError::InvalidDate { .. }));
    }

    #[test]
    fn test_batched_save() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        let mut store = MessageStore::load(&path, offset()).unwrap();
        store.record(1, 1, message("Иван", "текст", 0));

        for _ in 0..(SAVE_BATCH_SIZE - 1) {
            assert!(!store.save().unwrap());
        }
        assert!(!path.exists());
        assert!(store.save().unwrap());
        assert!(path.exists());
    }

    #[test]
    fn test_stats() {
        let dir = tempdir().unwrap();
        let mut store = MessageStore::load(dir.path().join("store.json"), offset()).unwrap();

        assert_eq!(store.stats(1).message_count, 0);

        store.record(1, 1, message("Иван", "старое", 5));
        store.record(1, 2, message("Иван", "новое", 1));

        let stats = store.stats(1);
        assert_eq!(stats.message_count, 2);
        assert!(stats.oldest.unwrap() < stats.newest.unwrap());
    }
}
