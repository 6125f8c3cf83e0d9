use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use vivi_agent::{CompletionClient, OpenAiProvider};
use vivi_core::ViviConfig;
use vivi_discord::{DiscordAdapter, Orchestrator};

const DEFAULT_FILTER: &str = "vivi_bot=info,vivi_discord=info,vivi_agent=info";
const VERBOSE_FILTER: &str = "vivi_bot=debug,vivi_discord=debug,vivi_agent=debug";

/// Discord chat companion backed by an OpenAI-compatible model.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config file (falls back to VIVI_CONFIG, then ~/.vivi/vivi.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // .env is optional; real environment variables win over it
    let dotenv = dotenvy::dotenv();

    let default_filter = if args.verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    match dotenv {
        Ok(path) => info!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => warn!(error = %e, "ignoring unreadable .env"),
    }

    // explicit path > VIVI_CONFIG env > ~/.vivi/vivi.toml
    let config_path = args.config.or_else(|| std::env::var("VIVI_CONFIG").ok());
    let config = ViviConfig::load(config_path.as_deref()).context("loading config")?;
    config.validate().context("invalid config")?;

    let provider = OpenAiProvider::new(
        config.provider.api_key.clone(),
        Some(config.provider.base_url.clone()),
    );
    let client = CompletionClient::new(
        Box::new(provider),
        config.provider.model.clone(),
        config.provider.max_tokens,
        config.chat.fallback_reply.clone(),
    );
    let orchestrator = Arc::new(
        Orchestrator::new(
            config.chat.clone(),
            config.discord.command_prefix.clone(),
            client,
        )
        .context("building orchestrator")?,
    );

    let adapter = DiscordAdapter::new(&config.discord, orchestrator)?;
    info!(
        model = %config.provider.model,
        designated = config.chat.designated_channels.len(),
        "Vivi starting"
    );

    tokio::select! {
        _ = adapter.run() => {}
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                warn!(error = %e, "ctrl-c handler failed");
            }
            info!("shutting down");
        }
    }

    Ok(())
}
