use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use sumbot::config::BotConfig;
use sumbot::telegram::TelegramClient;
use sumbot::{scheduler, BotApp};
use model::{ModelProvider, OpenAiConfig, OpenAiProvider};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "sumbot")]
#[command(about = "Telegram chat summarization bot")]
struct Cli {
    /// Environment file with secrets and settings
    #[arg(long, default_value = ".env")]
    env_file: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot (preflight, then the update loop)
    Run,
    /// Validate the environment file and required variables, then exit
    Check,
    /// Check connectivity to Telegram and the model API
    Health,
    /// Send the daily digest once and exit
    Digest,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = BotConfig::load(&cli.env_file)?;
    config.ensure_output_dir()?;

    match cli.command {
        Commands::Run => {
            let app = Arc::new(BotApp::new(config)?);
            app.run().await?;
        }
        Commands::Check => {
            println!("✓ Environment file loaded: {}", cli.env_file.display());
            println!("✓ TELEGRAM_BOT_TOKEN present");
            println!("✓ OPENAI_API_KEY present");
            println!("✓ Output directory ready: {}", config.output_dir.display());
            println!(
                "  Optional integrations: anthropic={} suno={} replicate={}",
                config.anthropic_api_key.is_some(),
                config.suno_api_key.is_some(),
                config.replicate_api_token.is_some()
            );
        }
        Commands::Health => {
            health_check(&config).await?;
        }
        Commands::Digest => {
            let app = BotApp::new(config)?;
            scheduler::run_daily_digest(&app).await?;
            app.store.lock().await.save_forced()?;
        }
    }

    Ok(())
}

async fn health_check(config: &BotConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("Performing health check...");

    let telegram = TelegramClient::new(&config.telegram_bot_token)?;
    match telegram.get_me().await {
        Ok(me) => {
            println!(
                "✓ Telegram reachable (bot @{})",
                me.username.as_deref().unwrap_or("unknown")
            );
            info!("Telegram health check successful");
        }
        Err(e) => {
            println!("✗ Telegram check failed: {}", e);
            error!("Telegram health check failed: {}", e);
            return Err(e.into());
        }
    }

    let provider = OpenAiProvider::new(OpenAiConfig::new(&config.openai_api_key))?;
    match provider.health_check().await {
        Ok(()) => {
            println!("✓ Model API reachable");
            info!("Model API health check successful");
        }
        Err(e) => {
            println!("✗ Model API check failed: {}", e);
            error!("Model API health check failed: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}
