//! Outbound delivery: fixed-size chunking and the platform send seam.

use std::sync::Arc;

use async_trait::async_trait;
use serenity::builder::CreateMessage;
use serenity::http::Http;
use serenity::model::id::{ChannelId, MessageId};

use crate::error::DiscordError;

/// Split `text` into consecutive pieces of at most `limit` characters.
///
/// Cuts on character boundaries only, so every chunk except the last is
/// exactly `limit` long and the concatenation equals the input.
pub fn split_chunks(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(limit)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

/// Where replies go. Implemented over serenity's REST client in production.
#[async_trait]
pub trait Outbound: Send + Sync {
    /// Show the typing indicator in a channel.
    async fn typing(&self, channel_id: u64) -> Result<(), DiscordError>;

    /// Post one message, optionally as a reply to `reply_to`.
    async fn send(
        &self,
        channel_id: u64,
        text: &str,
        reply_to: Option<u64>,
    ) -> Result<(), DiscordError>;
}

pub struct DiscordOutbound {
    http: Arc<Http>,
}

impl DiscordOutbound {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Outbound for DiscordOutbound {
    async fn typing(&self, channel_id: u64) -> Result<(), DiscordError> {
        ChannelId::new(channel_id)
            .broadcast_typing(&self.http)
            .await?;
        Ok(())
    }

    async fn send(
        &self,
        channel_id: u64,
        text: &str,
        reply_to: Option<u64>,
    ) -> Result<(), DiscordError> {
        let channel = ChannelId::new(channel_id);
        let mut msg = CreateMessage::new().content(text);
        if let Some(id) = reply_to {
            msg = msg.reference_message((channel, MessageId::new(id)));
        }
        channel.send_message(&self.http, msg).await?;
        Ok(())
    }
}
