//! Decides whether an inbound message gets a reply.
//!
//! A direct mention always does. Otherwise the bot only chimes in when the
//! conversation has built up enough context, the message looks like a
//! question, and the channel is designated for ambient replies.

use std::collections::HashSet;

use vivi_core::config::ChatConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerReason {
    Mention,
    Keyword,
}

#[derive(Debug, Clone)]
pub struct TriggerPolicy {
    keywords: Vec<String>,
    threshold: usize,
    designated: HashSet<u64>,
}

impl TriggerPolicy {
    pub fn new(keywords: &[String], threshold: usize, designated: &[u64]) -> Self {
        Self {
            keywords: keywords
                .iter()
                .map(|k| k.to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
            threshold,
            designated: designated.iter().copied().collect(),
        }
    }

    pub fn from_config(chat: &ChatConfig) -> Self {
        Self::new(&chat.keywords, chat.message_threshold, &chat.designated_channels)
    }

    /// `cached_chars` is the conversation size including this message.
    pub fn evaluate(
        &self,
        mentioned: bool,
        cached_chars: usize,
        content: &str,
        channel_id: u64,
    ) -> Option<TriggerReason> {
        if mentioned {
            return Some(TriggerReason::Mention);
        }
        let ambient = cached_chars > self.threshold
            && self.has_keyword(content)
            && self.designated.contains(&channel_id);
        ambient.then_some(TriggerReason::Keyword)
    }

    /// Substring match, case-insensitive, so "?" and "why" inside "whynot" count.
    pub fn has_keyword(&self, content: &str) -> bool {
        let lower = content.to_lowercase();
        self.keywords.iter().any(|k| lower.contains(k.as_str()))
    }
}
