use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one channel-scoped conversation.
///
/// Built from numeric guild and channel ids, never display names, so two
/// channels can never share a buffer.
/// Format: `guild:{guild_id}:channel:{channel_id}` or `dm:{channel_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey(String);

impl ConversationKey {
    pub fn new(guild_id: Option<u64>, channel_id: u64) -> Self {
        match guild_id {
            Some(gid) => Self(format!("guild:{}:channel:{}", gid, channel_id)),
            None => Self(format!("dm:{}", channel_id)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who spoke. Decided once when the record is created so prompt assembly
/// never compares identities again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Author {
    /// The bot itself; becomes the `assistant` role.
    Bot,
    External { id: u64, name: String },
}

impl Author {
    pub fn external(id: u64, name: impl Into<String>) -> Self {
        Author::External {
            id,
            name: name.into(),
        }
    }

    pub fn is_bot(&self) -> bool {
        matches!(self, Author::Bot)
    }
}

/// A validated image attachment URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef(pub String);

impl ImageRef {
    pub fn url(&self) -> &str {
        &self.0
    }
}

/// One buffered message of a conversation, inbound or outbound.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub timestamp: DateTime<Utc>,
    pub author: Author,
    /// Message text with the bot mention already stripped.
    pub content: String,
    /// Display name of the author being replied to, when resolvable.
    pub reply_target: Option<String>,
    #[serde(default)]
    pub attachment_refs: Vec<ImageRef>,
}

impl MessageRecord {
    pub fn new(author: Author, content: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            author,
            content: content.into(),
            reply_target: None,
            attachment_refs: Vec::new(),
        }
    }

    pub fn with_reply_target(mut self, target: Option<String>) -> Self {
        self.reply_target = target;
        self
    }

    pub fn with_images(mut self, images: Vec<ImageRef>) -> Self {
        self.attachment_refs = images;
        self
    }

    /// Size of this record for budget accounting, in characters.
    pub fn text_len(&self) -> usize {
        self.content.chars().count()
    }
}
