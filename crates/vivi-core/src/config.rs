use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_COMMAND_PREFIX: &str = "$";
pub const DEFAULT_CHARACTER_LIMIT: usize = 2000; // Discord hard cap per message
pub const DEFAULT_MESSAGE_THRESHOLD: usize = 5_000;
pub const DEFAULT_SEND_LIMIT: usize = 10_000;
pub const DEFAULT_MAX_CACHED_IMAGES: usize = 10;
pub const DEFAULT_ACTIVITY_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_PERSONA_NAME: &str = "Vivi";

const DEFAULT_PERSONA: &str = "You are Vivi, and you're suddenly in the middle of conversation in a discord server. \
You're a friendly, welcoming, adult girl, and always try to carry on conversation by making discussion and \
constructively adding to ideas and suggestions where appropriate. Be normal and give short succinct replies \
unless otherwise specified.";

const DEFAULT_FALLBACK_REPLY: &str = "Sorry I am kinda sleepy right now, can you ask me later?";

/// Top-level config (vivi.toml + VIVI_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViviConfig {
    pub discord: DiscordConfig,
    pub provider: ProviderConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    pub bot_token: String,
    /// Prefix for text commands (`$clear`, `$creator`, `$sync`).
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
    /// Discord user id allowed to run owner-only commands.
    #[serde(default)]
    pub owner_id: Option<u64>,
    /// When set, slash commands are registered to this guild only (instant
    /// propagation, useful while testing).
    #[serde(default)]
    pub test_guild_id: Option<u64>,
    #[serde(default = "bool_true")]
    pub slash_commands: bool,
    /// Seconds between presence changes.
    #[serde(default = "default_activity_interval")]
    pub activity_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,
    /// Base URL (without trailing slash). Point at a local OpenAI-compatible
    /// server to run without an API key.
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

/// Conversation behaviour: triggering, buffering and reply shaping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Words that make the bot chime in on its own once enough context exists.
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
    /// Buffered characters required before a keyword can trigger a reply.
    #[serde(default = "default_message_threshold")]
    pub message_threshold: usize,
    /// Character budget of the context sent to the model.
    #[serde(default = "default_send_limit")]
    pub send_limit: usize,
    /// Maximum characters per outbound platform message.
    #[serde(default = "default_character_limit")]
    pub character_limit: usize,
    /// Channels where keyword (non-mention) triggering is allowed.
    #[serde(default)]
    pub designated_channels: Vec<u64>,
    #[serde(default = "default_max_cached_images")]
    pub max_cached_images: usize,
    /// Probe image attachments with an HTTP HEAD before buffering them.
    #[serde(default)]
    pub verify_images: bool,
    #[serde(default = "default_persona")]
    pub persona: String,
    #[serde(default = "default_persona_name")]
    pub persona_name: String,
    /// Apply the mild stylization to every reply.
    #[serde(default = "bool_true")]
    pub stylize: bool,
    #[serde(default = "default_fallback_reply")]
    pub fallback_reply: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
            message_threshold: DEFAULT_MESSAGE_THRESHOLD,
            send_limit: DEFAULT_SEND_LIMIT,
            character_limit: DEFAULT_CHARACTER_LIMIT,
            designated_channels: Vec::new(),
            max_cached_images: DEFAULT_MAX_CACHED_IMAGES,
            verify_images: false,
            persona: default_persona(),
            persona_name: default_persona_name(),
            stylize: true,
            fallback_reply: default_fallback_reply(),
        }
    }
}

impl ChatConfig {
    pub fn is_designated(&self, channel_id: u64) -> bool {
        self.designated_channels.contains(&channel_id)
    }
}

fn bool_true() -> bool {
    true
}
fn default_command_prefix() -> String {
    DEFAULT_COMMAND_PREFIX.to_string()
}
fn default_activity_interval() -> u64 {
    DEFAULT_ACTIVITY_INTERVAL_SECS
}
fn default_openai_base_url() -> String {
    DEFAULT_OPENAI_BASE_URL.to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_keywords() -> Vec<String> {
    ["why", "what", "how", "?", "wtf", "huh"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_message_threshold() -> usize {
    DEFAULT_MESSAGE_THRESHOLD
}
fn default_send_limit() -> usize {
    DEFAULT_SEND_LIMIT
}
fn default_character_limit() -> usize {
    DEFAULT_CHARACTER_LIMIT
}
fn default_max_cached_images() -> usize {
    DEFAULT_MAX_CACHED_IMAGES
}
fn default_persona() -> String {
    DEFAULT_PERSONA.to_string()
}
fn default_persona_name() -> String {
    DEFAULT_PERSONA_NAME.to_string()
}
fn default_fallback_reply() -> String {
    DEFAULT_FALLBACK_REPLY.to_string()
}

impl ViviConfig {
    /// Load config from a TOML file with VIVI_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.vivi/vivi.toml
    ///
    /// A missing file is fine as long as the environment supplies the
    /// required keys (e.g. `VIVI_DISCORD__BOT_TOKEN`).
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Self::figment(&path)
            .extract::<ViviConfig>()
            .map_err(|e| crate::error::ViviError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        // `__` separates nesting so keys like `bot_token` survive intact.
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("VIVI_").split("__"))
    }

    /// Reject settings the bot cannot run with. Called once at startup;
    /// everything downstream assumes a validated config.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::ViviError;

        if self.discord.bot_token.trim().is_empty() {
            return Err(ViviError::Config("discord.bot_token is empty".into()));
        }
        if self.provider.api_key.trim().is_empty()
            && self.provider.base_url.trim_end_matches('/') == DEFAULT_OPENAI_BASE_URL
        {
            return Err(ViviError::Config(
                "provider.api_key is required for the default endpoint".into(),
            ));
        }
        if self.chat.character_limit == 0 {
            return Err(ViviError::Config("chat.character_limit must be > 0".into()));
        }
        if self.chat.send_limit == 0 {
            return Err(ViviError::Config("chat.send_limit must be > 0".into()));
        }
        if self.discord.activity_interval_secs == 0 {
            return Err(ViviError::Config(
                "discord.activity_interval_secs must be > 0".into(),
            ));
        }
        Ok(())
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.vivi/vivi.toml", home)
}
