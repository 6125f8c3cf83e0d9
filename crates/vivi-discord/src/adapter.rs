use std::sync::Arc;
use std::time::Duration;

use serenity::model::gateway::GatewayIntents;
use serenity::Client;
use tracing::{error, info, warn};

use vivi_core::config::DiscordConfig;

use crate::error::DiscordError;
use crate::handler::DiscordHandler;
use crate::orchestrator::Orchestrator;

/// Discord channel adapter.
///
/// Wraps a serenity `Client` and drives the event loop until the process exits.
/// Reconnects whenever the gateway drops.
pub struct DiscordAdapter {
    orchestrator: Arc<Orchestrator>,
    config: DiscordConfig,
}

impl DiscordAdapter {
    pub fn new(
        config: &DiscordConfig,
        orchestrator: Arc<Orchestrator>,
    ) -> Result<Self, DiscordError> {
        if config.bot_token.trim().is_empty() {
            return Err(DiscordError::NoToken);
        }
        Ok(Self {
            orchestrator,
            config: config.clone(),
        })
    }

    /// Connect to Discord and keep reconnecting whenever the gateway drops.
    ///
    /// Never returns; cancel it (drop the future) to shut down.
    pub async fn run(self) {
        let intents = GatewayIntents::GUILDS
            | GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::DIRECT_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT;

        loop {
            let mut client = loop {
                match self.build_client(intents).await {
                    Ok(c) => break c,
                    Err(e) => {
                        error!("Discord: connect failed ({e}), retrying in 30s");
                        tokio::time::sleep(Duration::from_secs(30)).await;
                    }
                }
            };

            info!("Discord: gateway connecting");

            if let Err(e) = client.start().await {
                warn!("Discord: gateway error ({e}), reconnecting in 5s");
            } else {
                info!("Discord: gateway stopped cleanly, reconnecting in 5s");
            }

            tokio::time::sleep(Duration::from_secs(5)).await;
        }
    }

    /// Build a fresh serenity `Client` with our event handler.
    async fn build_client(&self, intents: GatewayIntents) -> Result<Client, serenity::Error> {
        let handler = DiscordHandler::new(Arc::clone(&self.orchestrator), self.config.clone());

        Client::builder(&self.config.bot_token, intents)
            .event_handler(handler)
            .await
    }
}
