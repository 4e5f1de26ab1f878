use regex::Regex;
use reqwest::multipart;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum TelegramError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Telegram API error: {description}")]
    Api { description: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type TelegramResult<T> = Result<T, TelegramError>;

impl TelegramError {
    /// Whether the API rejected the message because of its HTML entities.
    pub fn is_parse_error(&self) -> bool {
        match self {
            Self::Api { description } => {
                let lower = description.to_lowercase();
                lower.contains("parse entities") || lower.contains("can't parse")
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub inline_query: Option<InlineQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub date: i64,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub voice: Option<Voice>,
    #[serde(default)]
    pub via_bot: Option<User>,
}

impl Message {
    pub fn sender_name(&self) -> String {
        self.from
            .as_ref()
            .map(|u| u.first_name.clone())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "Аноним".to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Voice {
    pub file_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InlineQuery {
    pub id: String,
    pub from: User,
    pub query: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramFile {
    pub file_id: String,
    #[serde(default)]
    pub file_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Me {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplyKeyboardMarkup {
    pub keyboard: Vec<Vec<KeyboardButton>>,
    pub resize_keyboard: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyboardButton {
    pub text: String,
}

impl ReplyKeyboardMarkup {
    pub fn from_rows(rows: &[&[&str]]) -> Self {
        Self {
            keyboard: rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|text| KeyboardButton {
                            text: (*text).to_string(),
                        })
                        .collect()
                })
                .collect(),
            resize_keyboard: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InlineArticle {
    #[serde(rename = "type")]
    kind: &'static str,
    pub id: String,
    pub title: String,
    pub input_message_content: InputMessageContent,
}

#[derive(Debug, Clone, Serialize)]
pub struct InputMessageContent {
    pub message_text: String,
}

impl InlineArticle {
    pub fn new(id: impl Into<String>, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: "article",
            id: id.into(),
            title: title.into(),
            input_message_content: InputMessageContent {
                message_text: text.into(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

pub struct TelegramClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl TelegramClient {
    pub fn new(token: impl Into<String>) -> TelegramResult<Self> {
        Self::with_base_url(token, "https://api.telegram.org")
    }

    pub fn with_base_url(
        token: impl Into<String>,
        base_url: impl Into<String>,
    ) -> TelegramResult<Self> {
        // The timeout must stay above the long-poll window.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(75))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            token: token.into(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> TelegramResult<T> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(&body)
            .send()
            .await?;

        let envelope: ApiEnvelope<T> = response.json().await?;

        if !envelope.ok {
            return Err(TelegramError::Api {
                description: envelope
                    .description
                    .unwrap_or_else(|| format!("{} failed", method)),
            });
        }

        envelope.result.ok_or_else(|| TelegramError::Api {
            description: format!("{} returned no result", method),
        })
    }

    async fn call_multipart<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        form: multipart::Form,
    ) -> TelegramResult<T> {
        let response = self
            .client
            .post(self.method_url(method))
            .multipart(form)
            .send()
            .await?;

        let envelope: ApiEnvelope<T> = response.json().await?;

        if !envelope.ok {
            return Err(TelegramError::Api {
                description: envelope
                    .description
                    .unwrap_or_else(|| format!("{} failed", method)),
            });
        }

        envelope.result.ok_or_else(|| TelegramError::Api {
            description: format!("{} returned no result", method),
        })
    }

    pub async fn get_me(&self) -> TelegramResult<Me> {
        self.call("getMe", json!({})).await
    }

    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u64,
    ) -> TelegramResult<Vec<Update>> {
        let mut body = json!({
            "timeout": timeout_secs,
            "allowed_updates": ["message", "inline_query"],
        });
        if let Some(offset) = offset {
            body["offset"] = json!(offset);
        }

        let updates: Vec<Update> = self.call("getUpdates", body).await?;
        if !updates.is_empty() {
            debug!("Received {} updates", updates.len());
        }
        Ok(updates)
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> TelegramResult<Message> {
        self.call(
            "sendMessage",
            json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "HTML",
            }),
        )
        .await
    }

    pub async fn send_message_plain(&self, chat_id: i64, text: &str) -> TelegramResult<Message> {
        self.call(
            "sendMessage",
            json!({
                "chat_id": chat_id,
                "text": text,
            }),
        )
        .await
    }

    pub async fn send_message_with_keyboard(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: &ReplyKeyboardMarkup,
    ) -> TelegramResult<Message> {
        self.call(
            "sendMessage",
            json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "HTML",
                "reply_markup": keyboard,
            }),
        )
        .await
    }

    /// Send HTML text, converting `**bold**` markdown first and falling
    /// back to a tag-stripped plain message when the API rejects the
    /// entities.
    pub async fn safe_send(&self, chat_id: i64, text: &str) -> TelegramResult<Message> {
        let html = markdown_bold_to_html(text);

        match self.send_message(chat_id, &html).await {
            Ok(message) => Ok(message),
            Err(e) if e.is_parse_error() => {
                warn!("HTML formatting rejected, resending as plain text: {}", e);
                self.send_message_plain(chat_id, &strip_formatting(text))
                    .await
            }
            Err(e) => Err(e),
        }
    }

    pub async fn delete_message(&self, chat_id: i64, message_id: i64) -> TelegramResult<()> {
        let _: bool = self
            .call(
                "deleteMessage",
                json!({
                    "chat_id": chat_id,
                    "message_id": message_id,
                }),
            )
            .await?;
        Ok(())
    }

    pub async fn send_photo(
        &self,
        chat_id: i64,
        photo: Vec<u8>,
        filename: &str,
        caption: &str,
    ) -> TelegramResult<Message> {
        let part = multipart::Part::bytes(photo).file_name(filename.to_string());

        let form = multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .text("parse_mode", "HTML")
            .part("photo", part);

        self.call_multipart("sendPhoto", form).await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn send_audio(
        &self,
        chat_id: i64,
        audio: Vec<u8>,
        filename: &str,
        thumbnail: Option<Vec<u8>>,
        title: &str,
        performer: &str,
        caption: &str,
    ) -> TelegramResult<Message> {
        let audio_part = multipart::Part::bytes(audio).file_name(filename.to_string());

        let mut form = multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .text("title", title.to_string())
            .text("performer", performer.to_string())
            .text("caption", caption.to_string())
            .text("parse_mode", "HTML")
            .part("audio", audio_part);

        if let Some(thumbnail) = thumbnail {
            let thumb_part = multipart::Part::bytes(thumbnail).file_name("cover.jpg".to_string());
            form = form.part("thumbnail", thumb_part);
        }

        self.call_multipart("sendAudio", form).await
    }

    pub async fn answer_inline_query(
        &self,
        query_id: &str,
        results: &[InlineArticle],
        cache_time: u32,
    ) -> TelegramResult<()> {
        let _: bool = self
            .call(
                "answerInlineQuery",
                json!({
                    "inline_query_id": query_id,
                    "results": results,
                    "cache_time": cache_time,
                }),
            )
            .await?;
        Ok(())
    }

    pub async fn get_file(&self, file_id: &str) -> TelegramResult<TelegramFile> {
        self.call("getFile", json!({ "file_id": file_id })).await
    }

    pub async fn download_file(&self, file_path: &str) -> TelegramResult<Vec<u8>> {
        let url = format!("{}/file/bot{}/{}", self.base_url, self.token, file_path);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(TelegramError::Api {
                description: format!("File download failed: {}", response.status()),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// Replace `**bold**` spans with `<b>` tags.
pub fn markdown_bold_to_html(text: &str) -> String {
    let re = Regex::new(r"\*\*(.*?)\*\*").expect("static regex");
    re.replace_all(text, "<b>$1</b>").to_string()
}

/// Drop HTML tags and markdown bold markers for the plain-text fallback.
pub fn strip_formatting(text: &str) -> String {
    let tags = Regex::new(r"<[^>]+>").expect("static regex");
    let bold = Regex::new(r"\*\*(.*?)\*\*").expect("static regex");

    let without_tags = tags.replace_all(text, "");
    bold.replace_all(&without_tags, "$1").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markdown_bold_to_html() {
        assert_eq!(
            markdown_bold_to_html("итоги **дня** и **недели**"),
            "итоги <b>дня</b> и <b>недели</b>"
        );
        assert_eq!(markdown_bold_to_html("ничего"), "ничего");
    }

    #[test]
    fn test_strip_formatting() {
        assert_eq!(
            strip_formatting("<b>Топ</b> за **сегодня**"),
            "Топ за сегодня"
        );
    }

    #[test]
    fn test_sender_name_fallback() {
        let message = Message {
            message_id: 1,
            date: 0,
            chat: Chat { id: 1 },
            from: None,
            text: None,
            voice: None,
            via_bot: None,
        };
        assert_eq!(message.sender_name(), "Аноним");
    }

    #[test]
    fn test_keyboard_serialization() {
        let keyboard = ReplyKeyboardMarkup::from_rows(&[&["📋 Итоги", "🏆 Топ дня"]]);
        let json = serde_json::to_value(&keyboard).unwrap();
        assert_eq!(json["resize_keyboard"], true);
        assert_eq!(json["keyboard"][0][0]["text"], "📋 Итоги");
    }

    #[test]
    fn test_inline_article_serialization() {
        let article = InlineArticle::new("id1", "Итоги дня", "текст");
        let json = serde_json::to_value(&article).unwrap();
        assert_eq!(json["type"], "article");
        assert_eq!(json["input_message_content"]["message_text"], "текст");
    }

    #[test]
    fn test_parse_error_detection() {
        let err = TelegramError::Api {
            description: "Bad Request: can't parse entities".to_string(),
        };
        assert!(err.is_parse_error());

        let err = TelegramError::Api {
            description: "Forbidden: bot was blocked".to_string(),
        };
        assert!(!err.is_parse_error());
    }

    #[tokio::test]
    async fn test_get_updates_against_mock() {
        use httpmock::prelude::*;

        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/botTEST/getUpdates");
            then.status(200).json_body(serde_json::json!({
                "ok": true,
                "result": [{
                    "update_id": 7,
                    "message": {
                        "message_id": 1,
                        "date": 1700000000,
                        "chat": {"id": -100},
                        "from": {"id": 42, "first_name": "Иван"},
                        "text": "привет"
                    }
                }]
            }));
        });

        let client = TelegramClient::with_base_url("TEST", server.base_url()).unwrap();
        let updates = client.get_updates(None, 0).await.unwrap();

        assert_eq!(updates.len(), 1);
        let message = updates[0].message.as_ref().unwrap();
        assert_eq!(message.chat.id, -100);
        assert_eq!(message.sender_name(), "Иван");
    }

    #[tokio::test]
    async fn test_api_error_surfaces_description() {
        use httpmock::prelude::*;

        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/botTEST/sendMessage");
            then.status(400).json_body(serde_json::json!({
                "ok": false,
                "description": "Bad Request: can't parse entities"
            }));
        });

        let client = TelegramClient::with_base_url("TEST", server.base_url()).unwrap();
        let err = client.send_message(1, "<broken").await.unwrap_err();
        assert!(err.is_parse_error());
    }
}
