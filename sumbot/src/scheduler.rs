use crate::bot::{BotApp, BotResult};
use crate::song::{self, PendingSongTask};
use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, Utc};
use media::SunoTrack;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const SONG_POLL_TICK: Duration = Duration::from_secs(5);

/// How long until the next occurrence of `hour:minute` local time.
pub fn next_digest_delay(now: DateTime<FixedOffset>, hour: u32, minute: u32) -> Duration {
    let today_target = now
        .date_naive()
        .and_hms_opt(hour, minute, 0)
        .and_then(|naive| naive.and_local_timezone(*now.offset()).single())
        .unwrap_or(now);

    let target = if today_target > now {
        today_target
    } else {
        today_target + ChronoDuration::days(1)
    };

    (target - now).to_std().unwrap_or(Duration::from_secs(60))
}

/// Fire the daily digest at the configured wall-clock time, forever.
pub async fn daily_digest_loop(app: Arc<BotApp>) {
    loop {
        let now = Utc::now().with_timezone(&app.local_offset());
        let delay = next_digest_delay(
            now,
            app.config.daily_digest_hour,
            app.config.daily_digest_minute,
        );
        info!("Next daily digest in {}s", delay.as_secs());
        tokio::time::sleep(delay).await;

        if let Err(e) = run_daily_digest(&app).await {
            error!("Daily digest failed: {}", e);
        }
    }
}

/// One digest pass: for every chat that spoke today, send the
/// participant ranking and the director gift, then trim assistant
/// threads.
pub async fn run_daily_digest(app: &BotApp) -> BotResult<()> {
    info!("Starting daily digest");

    let chat_ids = {
        let store = app.store.lock().await;
        store.chat_ids()
    };

    for chat_id in chat_ids {
        let (today, last_day) = {
            let store = app.store.lock().await;
            (
                store.messages_today(chat_id),
                store.messages_last_hours(chat_id, 24),
            )
        };

        if today.trim().is_empty() {
            continue;
        }

        match app.summarizer.top(&last_day, "последние 24 часа").await {
            Ok(top) => {
                if let Err(e) = app
                    .telegram
                    .safe_send(
                        chat_id,
                        &format!("🏆 <b>Топ участников за последние 24 часа:</b>\n\n{}", top),
                    )
                    .await
                {
                    error!("Failed to send digest to chat {}: {}", chat_id, e);
                    continue;
                }
            }
            Err(e) => {
                error!("Digest ranking failed for chat {}: {}", chat_id, e);
                continue;
            }
        }

        tokio::time::sleep(Duration::from_secs(2)).await;

        if let Err(e) = app.run_gift_flow(chat_id).await {
            error!("Digest gift failed for chat {}: {}", chat_id, e);
        }
    }

    app.assistant.cleanup().await;
    Ok(())
}

/// Drive pending music-generation tasks to completion.
pub async fn song_poll_loop(app: Arc<BotApp>) {
    loop {
        tokio::time::sleep(SONG_POLL_TICK).await;

        for task in app.song_tasks.take_due().await {
            process_song_task(&app, task).await;
        }
    }
}

async fn process_song_task(app: &BotApp, task: PendingSongTask) {
    let Some(suno) = &app.suno else {
        warn!("Music task {} pending but no client configured", task.task_id);
        return;
    };

    match suno.task_status(&task.task_id).await {
        Ok(Some(record)) if record.is_success() => {
            if let Err(e) = deliver_tracks(app, &task, record.tracks()).await {
                error!("Failed to deliver tracks for {}: {}", task.task_id, e);
            }
        }
        Ok(Some(record)) if record.is_terminal_failure() => {
            error!("Music generation failed: {}", record.status);
            let _ = app
                .telegram
                .safe_send(
                    task.chat_id,
                    &format!(
                        "❌ <b>Ошибка генерации музыки</b>\n\nСтатус: {}\n\
                         Попробуйте создать песню заново.",
                        record.status
                    ),
                )
                .await;
        }
        Ok(Some(record)) => {
            info!("Task {} still {}, rechecking", task.task_id, record.status);
            app.song_tasks.reschedule(task, song::RETRY_PENDING).await;
        }
        Ok(None) => {
            warn!("Task {} unknown to the backend, rechecking", task.task_id);
            app.song_tasks.reschedule(task, song::RETRY_UNKNOWN).await;
        }
        Err(e) => {
            error!("Status check failed for {}: {}", task.task_id, e);
            app.song_tasks.reschedule(task, song::RETRY_ERROR).await;
        }
    }
}

async fn deliver_tracks(
    app: &BotApp,
    task: &PendingSongTask,
    tracks: &[SunoTrack],
) -> BotResult<()> {
    let Some(suno) = &app.suno else {
        return Ok(());
    };

    if tracks.is_empty() {
        app.telegram
            .safe_send(
                task.chat_id,
                &format!(
                    "🎵 <b>Музыка готова!</b> 🎵\n\n\
                     Название: <b>{}</b>\n\
                     Жанр: <b>{}</b>\n\
                     Настроение: <b>{}</b>\n\n\
                     Но данные о треках не найдены.",
                    task.song.song_title, task.song.genre, task.song.mood
                ),
            )
            .await?;
        return Ok(());
    }

    info!(
        "Delivering song '{}': {} tracks",
        task.song.song_title,
        tracks.len()
    );

    let performer = Utc::now()
        .with_timezone(&app.local_offset())
        .format("%d.%m.%y")
        .to_string();

    for (index, track) in tracks.iter().enumerate() {
        let number = index + 1;

        let delivered = match (&track.audio_url, &track.image_url) {
            (Some(audio_url), Some(image_url)) => {
                match send_audio_track(app, task, suno, audio_url, image_url, number, &performer)
                    .await
                {
                    Ok(()) => true,
                    Err(e) => {
                        error!("Failed to send track {}: {}", number, e);
                        false
                    }
                }
            }
            _ => false,
        };

        if !delivered {
            let fallback = format!(
                "🎵 <b>Трек {}</b>\nАудио: {}\nОбложка: {}",
                number,
                track.audio_url.as_deref().unwrap_or("N/A"),
                track.image_url.as_deref().unwrap_or("N/A")
            );
            app.telegram.safe_send(task.chat_id, &fallback).await?;
        }
    }

    Ok(())
}

async fn send_audio_track(
    app: &BotApp,
    task: &PendingSongTask,
    suno: &media::SunoClient,
    audio_url: &str,
    image_url: &str,
    number: usize,
    performer: &str,
) -> BotResult<()> {
    let audio = suno.download(audio_url).await?;
    let cover = suno.download(image_url).await?;

    app.telegram
        .send_audio(
            task.chat_id,
            audio,
            &format!("track{}.mp3", number),
            Some(cover),
            &format!("{} - Трек {}", task.song.song_title, number),
            performer,
            &format!("🎵 <b>Трек {}</b>", number),
        )
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn offset() -> FixedOffset {
        FixedOffset::east_opt(3 * 3600).unwrap()
    }

    #[test]
    fn test_next_digest_later_today() {
        let now = offset().with_ymd_and_hms(2024, 7, 20, 10, 0, 0).unwrap();
        let delay = next_digest_delay(now, 23, 59);
        assert_eq!(delay, Duration::from_secs((13 * 60 + 59) * 60));
    }

    #[test]
    fn test_next_digest_rolls_to_tomorrow() {
        let now = offset().with_ymd_and_hms(2024, 7, 20, 23, 59, 30).unwrap();
        let delay = next_digest_delay(now, 23, 59);
        // 30 seconds short of a full day.
        assert_eq!(delay, Duration::from_secs(24 * 3600 - 30));
    }

    #[test]
    fn test_next_digest_exact_boundary() {
        let now = offset().with_ymd_and_hms(2024, 7, 20, 23, 59, 0).unwrap();
        let delay = next_digest_delay(now, 23, 59);
        assert_eq!(delay, Duration::from_secs(24 * 3600));
    }
}
