//! Bot commands: `clear`, `creator`, `sync`.
//!
//! Available as prefixed text commands (`$clear`) and, when enabled, as
//! slash commands. Registration happens in `ready()`; interactions are
//! dispatched from `interaction_create` in the event handler.

use serenity::builder::{
    CreateCommand, CreateInteractionResponse, CreateInteractionResponseMessage,
};
use serenity::model::application::CommandInteraction;
use serenity::model::channel::Message;
use serenity::model::id::GuildId;
use serenity::prelude::Context;
use tracing::{info, warn};

use vivi_core::config::DiscordConfig;
use vivi_core::ConversationKey;

use crate::orchestrator::Orchestrator;

const CLEARED: &str = "I have suddenly developed amnesia, UwU!";
const NOTHING_TO_CLEAR: &str = "No history found for this channel, b-baka!";
const SYNCED: &str = "Command tree synced.";
const NOT_OWNER: &str = "You must be the owner to use this command!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Forget this channel's conversation.
    Clear,
    /// Say who made the bot.
    Creator,
    /// Re-register slash commands (owner only).
    Sync,
}

impl Command {
    /// Recognize `{prefix}name [args]`. Unknown names are not commands and
    /// flow into the conversation like any other message.
    pub fn parse(content: &str, prefix: &str) -> Option<Self> {
        let rest = content.trim_start().strip_prefix(prefix)?;
        let name = rest.split_whitespace().next()?;
        Self::from_name(name)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "clear" => Some(Command::Clear),
            "creator" => Some(Command::Creator),
            "sync" => Some(Command::Sync),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Clear => "clear",
            Command::Creator => "creator",
            Command::Sync => "sync",
        }
    }
}

pub fn clear_reply(cleared: bool) -> &'static str {
    if cleared {
        CLEARED
    } else {
        NOTHING_TO_CLEAR
    }
}

pub fn creator_reply(owner_id: Option<u64>) -> String {
    match owner_id {
        Some(id) => format!("I was created by <@!{}>!", id),
        None => "I don't remember who made me...".to_string(),
    }
}

fn is_owner(config: &DiscordConfig, user_id: u64) -> bool {
    config.owner_id == Some(user_id)
}

/// Build the slash command set.
fn definitions() -> Vec<CreateCommand> {
    vec![
        CreateCommand::new("clear").description("Forget conversation history in the channel"),
        CreateCommand::new("creator").description("Who created me?"),
        CreateCommand::new("sync").description("Sync slash commands"),
    ]
}

/// Register slash commands, per guild when a test guild is configured.
pub async fn register_commands(
    ctx: &Context,
    guild_id: Option<GuildId>,
) -> Result<usize, serenity::Error> {
    let count = match guild_id {
        Some(gid) => {
            let cmds = gid.set_commands(&ctx.http, definitions()).await?;
            info!(guild = %gid, count = cmds.len(), "registered guild slash commands");
            cmds.len()
        }
        None => {
            let cmds =
                serenity::model::application::Command::set_global_commands(&ctx.http, definitions())
                    .await?;
            info!(count = cmds.len(), "registered global slash commands");
            cmds.len()
        }
    };
    Ok(count)
}

/// Run a text command parsed from a channel message.
pub async fn run_text_command(
    orch: &Orchestrator,
    config: &DiscordConfig,
    ctx: &Context,
    msg: &Message,
    command: Command,
) {
    let reply = match command {
        Command::Clear => {
            let key = ConversationKey::new(msg.guild_id.map(|g| g.get()), msg.channel_id.get());
            clear_reply(orch.clear(&key)).to_string()
        }
        Command::Creator => creator_reply(config.owner_id),
        Command::Sync => sync(config, ctx, msg.author.id.get()).await.to_string(),
    };

    if let Err(e) = msg.reply(&ctx.http, reply).await {
        warn!(command = command.name(), error = %e, "command reply failed");
    }
}

/// Dispatch a slash command interaction.
pub async fn handle_interaction(
    orch: &Orchestrator,
    config: &DiscordConfig,
    ctx: &Context,
    interaction: &CommandInteraction,
) {
    let reply = match Command::from_name(&interaction.data.name) {
        Some(Command::Clear) => {
            let key = ConversationKey::new(
                interaction.guild_id.map(|g| g.get()),
                interaction.channel_id.get(),
            );
            clear_reply(orch.clear(&key)).to_string()
        }
        Some(Command::Creator) => creator_reply(config.owner_id),
        Some(Command::Sync) => sync(config, ctx, interaction.user.id.get()).await.to_string(),
        None => "Unknown command.".to_string(),
    };

    let response = CreateInteractionResponse::Message(
        CreateInteractionResponseMessage::new().content(reply),
    );
    if let Err(e) = interaction.create_response(&ctx.http, response).await {
        warn!(command = %interaction.data.name, error = %e, "slash command error");
    }
}

async fn sync(config: &DiscordConfig, ctx: &Context, user_id: u64) -> &'static str {
    if !is_owner(config, user_id) {
        return NOT_OWNER;
    }
    match register_commands(ctx, config.test_guild_id.map(GuildId::new)).await {
        Ok(_) => SYNCED,
        Err(e) => {
            warn!(error = %e, "slash command sync failed");
            "Sync failed, check the logs."
        }
    }
}
