use std::sync::{Arc, Mutex};
use std::time::Duration;

use serenity::async_trait;
use serenity::model::application::Interaction;
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use serenity::model::id::GuildId;
use serenity::prelude::{Context, EventHandler};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use vivi_core::config::DiscordConfig;
use vivi_core::Author;

use crate::orchestrator::{Disposition, InboundMessage, Orchestrator};
use crate::send::DiscordOutbound;

/// Serenity event handler wired to the orchestrator.
pub struct DiscordHandler {
    pub orchestrator: Arc<Orchestrator>,
    pub config: DiscordConfig,
    /// Presence tasks of the current session; replaced on every `ready`.
    presence: Mutex<Vec<JoinHandle<()>>>,
}

impl DiscordHandler {
    pub fn new(orchestrator: Arc<Orchestrator>, config: DiscordConfig) -> Self {
        Self {
            orchestrator,
            config,
            presence: Mutex::new(Vec::new()),
        }
    }

    /// Start the presence rotation for this gateway session, stopping the
    /// one from a previous session.
    fn restart_presence(&self, ctx: &Context) {
        let (tx, rx) = mpsc::channel(4);
        let period = Duration::from_secs(self.config.activity_interval_secs);
        let tasks = vec![
            tokio::spawn(crate::presence::run_rotation(period, tx)),
            tokio::spawn(crate::presence::apply_presence(ctx.clone(), rx)),
        ];

        match self.presence.lock() {
            Ok(mut guard) => {
                for old in guard.drain(..) {
                    old.abort();
                }
                *guard = tasks;
            }
            Err(e) => warn!(error = %e, "presence task list poisoned"),
        }
    }

    fn to_inbound(&self, msg: &Message) -> InboundMessage {
        let bot_id = self.orchestrator.bot_id();
        let author = if bot_id == Some(msg.author.id.get()) {
            Author::Bot
        } else {
            Author::external(msg.author.id.get(), msg.author.name.clone())
        };

        // Reachability checks, when enabled, happen later in the reply path.
        let max_images = self.orchestrator.chat().max_cached_images;
        let images = crate::attach::image_refs(&msg.attachments, max_images);

        InboundMessage {
            message_id: msg.id.get(),
            guild_id: msg.guild_id.map(|g| g.get()),
            channel_id: msg.channel_id.get(),
            author,
            content: msg.content.clone(),
            mentions_bot: bot_id.is_some_and(|id| msg.mentions_user_id(id)),
            reply_author: msg
                .referenced_message
                .as_ref()
                .map(|r| r.author.name.clone()),
            images,
        }
    }
}

impl Drop for DiscordHandler {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.presence.lock() {
            for task in guard.drain(..) {
                task.abort();
            }
        }
    }
}

#[async_trait]
impl EventHandler for DiscordHandler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        self.orchestrator.set_bot_id(ready.user.id.get());
        info!(name = %ready.user.name, "Discord bot connected");

        self.restart_presence(&ctx);

        if self.config.slash_commands {
            let guild = self.config.test_guild_id.map(GuildId::new);
            if let Err(e) = crate::commands::register_commands(&ctx, guild).await {
                warn!(error = %e, "failed to register slash commands");
            }
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        debug!(
            author = %msg.author.name,
            guild = ?msg.guild_id,
            channel = %msg.channel_id,
            "message received"
        );

        let inbound = self.to_inbound(&msg);
        let out = DiscordOutbound::new(Arc::clone(&ctx.http));

        if let Disposition::Command(command) = self.orchestrator.handle(inbound, &out).await {
            crate::commands::run_text_command(&self.orchestrator, &self.config, &ctx, &msg, command)
                .await;
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if !self.config.slash_commands {
            return;
        }
        if let Interaction::Command(command) = interaction {
            crate::commands::handle_interaction(&self.orchestrator, &self.config, &ctx, &command)
                .await;
        }
    }
}
