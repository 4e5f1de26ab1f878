use crate::prompts;
use media::image::ImageGenerator;
use model::{extract_json, ChatMessage, ChatRequest, ModelProvider, ModelResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

fn unspecified() -> String {
    "Не указано".to_string()
}

/// Model verdict on who runs the chat and what to gift them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectorGift {
    #[serde(default = "unspecified")]
    pub director_name: String,
    #[serde(default = "unspecified")]
    pub director_analysis: String,
    #[serde(default = "unspecified")]
    pub gift_name: String,
    #[serde(default = "unspecified")]
    pub gift_description: String,
    #[serde(default = "unspecified")]
    pub gift_reasoning: String,
    #[serde(default)]
    pub gift_photo_prompt: String,
}

/// Ask the model to crown a director and invent a gift, based on the last
/// 24 hours of messages.
pub async fn analyze_director(
    provider: &Arc<dyn ModelProvider>,
    model: &str,
    messages: &str,
) -> ModelResult<DirectorGift> {
    let request = ChatRequest::new(
        model,
        vec![
            ChatMessage::system(prompts::DIRECTOR_GIFT_PROMPT),
            ChatMessage::user(format!(
                "Вот сообщения чата за последние 24 часа:\n\n{}",
                messages
            )),
        ],
    )
    .with_temperature(0.9)
    .with_max_tokens(1000);

    let response = provider.chat(request).await?;
    let text = response.first_content().unwrap_or_default();
    let gift: DirectorGift = extract_json(text)?;

    info!("Director analysis complete: {}", gift.director_name);
    Ok(gift)
}

pub fn format_gift_message(gift: &DirectorGift) -> String {
    format!(
        "🎁 <b>ПОДАРОК ДЛЯ ДИРЕКТОРА ЧАТА</b> 🎁\n\n\
         👑 <b>Директор:</b> {}\n\
         📊 <b>Анализ:</b> {}\n\n\
         🎁 <b>Подарок:</b> {}\n\
         📝 <b>Описание:</b> {}\n\n\
         🤔 <b>Почему именно этот подарок:</b>\n{}",
        gift.director_name,
        gift.director_analysis,
        gift.gift_name,
        gift.gift_description,
        gift.gift_reasoning
    )
}

/// Pull the director line out of a participant-ranking message. The model
/// is prompted to emit "Директор чата: Имя" but drifts in formatting.
pub fn extract_director_name(top_text: &str) -> Option<String> {
    let patterns = [
        r"(?im)Директор чата:\s*([^\n]+?)\s*$",
        r"(?im)\*\*Директор чата\*\*\s*[-–—]\s*([^\n]+?)\s*$",
        r"(?im)Директор чата\s*[-–—]\s*([^\n]+?)\s*$",
        r"(?im)^\s*\*?\*?Директор(?:\s+чата)?\*?\*?\s*[:\-–—]\s*([^\n]+?)\s*$",
    ];

    for pattern in patterns {
        let re = Regex::new(pattern).expect("static regex");
        if let Some(captures) = re.captures(top_text) {
            let raw = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
            let markers = Regex::new(r"[*_`]").expect("static regex");
            let cleaned = markers.replace_all(raw, "");
            let cleaned = cleaned.trim().trim_end_matches(['!', '.']).trim();

            if !cleaned.is_empty() {
                info!("Director found: {}", cleaned);
                return Some(cleaned.to_string());
            }
        }
    }

    warn!("No director line found in ranking text");
    None
}

/// Words the image-prompt model refuses on; swapped for neutral terms
/// before the description reaches it.
const WORD_REPLACEMENTS: [(&str, &str); 7] = [
    ("лох", "участник"),
    ("дурак", "участник"),
    ("идиот", "участник"),
    ("мудак", "участник"),
    ("опущенный", "скромный"),
    ("душнила", "аналитик"),
    ("жертва", "помощник"),
];

pub fn sanitize_description(description: &str) -> String {
    let mut cleaned = description.to_lowercase();
    for (bad, good) in WORD_REPLACEMENTS {
        cleaned = cleaned.replace(bad, good);
    }
    cleaned.trim().to_string()
}

const PORTRAIT_SUFFIX: &str = "professional corporate headshot, business suit, serious \
expression, studio lighting, neutral background, direct eye contact, confident pose, high \
resolution, realistic, 8k";

const FALLBACK_PORTRAIT_PROMPT: &str = "Professional corporate executive headshot, serious \
businessman in dark suit, confident direct gaze, studio lighting, neutral office background, \
formal pose, high resolution, realistic, 8k quality";

/// Build the image prompt for the director portrait. Model refusals and
/// errors degrade to a canned corporate-headshot prompt.
pub async fn portrait_prompt(
    provider: &Arc<dyn ModelProvider>,
    model: &str,
    director_info: &str,
) -> String {
    let cleaned = sanitize_description(director_info);

    let request = ChatRequest::new(
        model,
        vec![
            ChatMessage::system(prompts::PORTRAIT_PROMPT),
            ChatMessage::user(format!(
                "Создай промпт для фотографии человека на основе этого описания:\n\n{}",
                cleaned
            )),
        ],
    )
    .with_temperature(0.7)
    .with_max_tokens(200);

    match provider.chat(request).await {
        Ok(response) => match response.first_content() {
            Some(prompt) if !prompt.trim().is_empty() => {
                format!("{}, {}", prompt.trim(), PORTRAIT_SUFFIX)
            }
            _ => FALLBACK_PORTRAIT_PROMPT.to_string(),
        },
        Err(e) => {
            warn!("Portrait prompt generation failed, using fallback: {}", e);
            FALLBACK_PORTRAIT_PROMPT.to_string()
        }
    }
}

/// Full director-photo pipeline: find the director in the ranking text,
/// build a portrait prompt, render and save the image.
pub async fn generate_director_photo(
    provider: &Arc<dyn ModelProvider>,
    model: &str,
    image_generator: &dyn ImageGenerator,
    top_text: &str,
    output_dir: &Path,
) -> Option<PathBuf> {
    let director_info = extract_director_name(top_text)?;
    let prompt = portrait_prompt(provider, model, &director_info).await;

    match image_generator
        .generate(&prompt, output_dir, "director_photo")
        .await
    {
        Ok(path) => Some(path),
        Err(e) => {
            warn!("Director photo generation failed: {}", e);
            None
        }
    }
}
