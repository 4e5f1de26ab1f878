//! Preflight contract: the bot refuses to start without its environment
//! file and required variables, and provisions the output directory
//! idempotently.

use serial_test::serial;
use std::fs;
use sumbot::config::{BotConfig, ConfigError};
use tempfile::tempdir;

fn clear_bot_env() {
    for name in [
        "TELEGRAM_BOT_TOKEN",
        "OPENAI_API_KEY",
        "ANTHROPIC_API_KEY",
        "SUNO_API_KEY",
        "REPLICATE_API_TOKEN",
        "REPLICATE_IMAGE_MODEL",
        "UTC_OFFSET_HOURS",
        "MESSAGE_STORE_FILE",
        "OUTPUT_DIR",
        "AUTO_RESPONSE_INTERVAL",
        "DAILY_DIGEST_HOUR",
        "DAILY_DIGEST_MINUTE",
    ] {
        std::env::remove_var(name);
    }
}

#[test]
#[serial]
fn missing_env_file_reports_remediation_hint() {
    clear_bot_env();
    let dir = tempdir().unwrap();
    let missing = dir.path().join(".env");

    let err = BotConfig::load(&missing).unwrap_err();

    assert!(matches!(err, ConfigError::MissingEnvFile { .. }));
    let message = err.to_string();
    assert!(message.contains(".env"));
    assert!(message.contains("TELEGRAM_BOT_TOKEN"));
}

#[test]
#[serial]
fn env_file_without_token_fails_after_loading() {
    clear_bot_env();
    let dir = tempdir().unwrap();
    let env_file = dir.path().join(".env");
    fs::write(&env_file, "# secrets\nOPENAI_API_KEY=sk-test\n").unwrap();

    let err = BotConfig::load(&env_file).unwrap_err();
    assert!(matches!(
        err,
        ConfigError::MissingVar { ref name } if name == "TELEGRAM_BOT_TOKEN"
    ));
}

#[test]
#[serial]
fn env_file_without_api_key_fails() {
    clear_bot_env();
    let dir = tempdir().unwrap();
    let env_file = dir.path().join(".env");
    fs::write(&env_file, "TELEGRAM_BOT_TOKEN=123:abc\n").unwrap();

    let err = BotConfig::load(&env_file).unwrap_err();
    assert!(matches!(
        err,
        ConfigError::MissingVar { ref name } if name == "OPENAI_API_KEY"
    ));
}

#[test]
#[serial]
fn valid_env_file_loads_and_provisions_output_dir() {
    clear_bot_env();
    let dir = tempdir().unwrap();
    let env_file = dir.path().join(".env");
    let output_dir = dir.path().join("media_out");

    fs::write(
        &env_file,
        format!(
            "# bot secrets\n\
             TELEGRAM_BOT_TOKEN=123:abc\n\
             OPENAI_API_KEY=sk-test\n\
             OUTPUT_DIR={}\n\
             UTC_OFFSET_HOURS=3\n",
            output_dir.display()
        ),
    )
    .unwrap();

    let config = BotConfig::load(&env_file).unwrap();
    assert_eq!(config.telegram_bot_token, "123:abc");
    assert_eq!(config.openai_api_key, "sk-test");

    assert!(!output_dir.exists());
    config.ensure_output_dir().unwrap();
    assert!(output_dir.is_dir());

    // Re-running must not fail when the directory already exists.
    config.ensure_output_dir().unwrap();
    assert!(output_dir.is_dir());
}

#[test]
#[serial]
fn comments_and_optional_settings_are_honored() {
    clear_bot_env();
    let dir = tempdir().unwrap();
    let env_file = dir.path().join(".env");

    fs::write(
        &env_file,
        "# main credentials\n\
         TELEGRAM_BOT_TOKEN=123:abc\n\
         OPENAI_API_KEY=sk-test\n\
         # tuning\n\
         AUTO_RESPONSE_INTERVAL=0\n\
         DAILY_DIGEST_HOUR=21\n\
         DAILY_DIGEST_MINUTE=30\n",
    )
    .unwrap();

    let config = BotConfig::load(&env_file).unwrap();
    assert_eq!(config.auto_response_interval, 0);
    assert_eq!(config.daily_digest_hour, 21);
    assert_eq!(config.daily_digest_minute, 30);
}
