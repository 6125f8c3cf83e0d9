//! Per-conversation message log, bounded by character budget and image count.
//!
//! Records are kept in arrival order. Every eviction removes from the
//! oldest end. Nothing is persisted.

use std::collections::VecDeque;

use dashmap::DashMap;
use tracing::debug;

use vivi_core::{ConversationKey, ImageRef, MessageRecord};

/// One conversation's records plus their running character total.
#[derive(Default)]
struct Conversation {
    records: VecDeque<MessageRecord>,
    chars: usize,
}

impl Conversation {
    fn push(&mut self, record: MessageRecord) {
        self.chars += record.text_len();
        self.records.push_back(record);
    }

    fn pop_oldest(&mut self) -> Option<MessageRecord> {
        let oldest = self.records.pop_front()?;
        self.chars -= oldest.text_len();
        Some(oldest)
    }
}

#[derive(Default)]
pub struct ContextBuffer {
    conversations: DashMap<ConversationKey, Conversation>,
}

impl ContextBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record, creating the conversation on first use.
    pub fn append(&self, key: &ConversationKey, record: MessageRecord) {
        self.conversations
            .entry(key.clone())
            .or_default()
            .push(record);
    }

    /// Forget a conversation. Returns whether there was anything to forget.
    pub fn clear(&self, key: &ConversationKey) -> bool {
        self.conversations
            .remove(key)
            .is_some_and(|(_, conv)| !conv.records.is_empty())
    }

    /// Number of records buffered for `key`.
    pub fn len(&self, key: &ConversationKey) -> usize {
        self.conversations
            .get(key)
            .map(|c| c.records.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, key: &ConversationKey) -> bool {
        self.len(key) == 0
    }

    /// Number of conversations currently tracked.
    pub fn conversation_count(&self) -> usize {
        self.conversations.len()
    }

    /// Sum of content lengths, in characters.
    pub fn total_text_size(&self, key: &ConversationKey) -> usize {
        self.conversations.get(key).map(|c| c.chars).unwrap_or(0)
    }

    /// Drop oldest records until the total fits `max_size`.
    ///
    /// Each pass removes a whole record, so zero-length records cannot stall
    /// the loop. Returns how many records were evicted.
    pub fn trim_to_budget(&self, key: &ConversationKey, max_size: usize) -> usize {
        let Some(mut conv) = self.conversations.get_mut(key) else {
            return 0;
        };
        let mut evicted = 0;

        while conv.chars > max_size {
            if conv.pop_oldest().is_none() {
                break;
            }
            evicted += 1;
        }

        if evicted > 0 {
            debug!(
                conversation = %key,
                evicted,
                remaining_chars = conv.chars,
                "trimmed context to budget"
            );
        }
        evicted
    }

    /// Keep at most `max_images` image references, favouring the newest.
    ///
    /// Walks newest → oldest spending the budget; once it runs out, older
    /// records lose images from the end of their own list. A record that
    /// straddles the limit keeps its first images. Returns how many
    /// references were dropped.
    pub fn trim_attachment_count(&self, key: &ConversationKey, max_images: usize) -> usize {
        let Some(mut conv) = self.conversations.get_mut(key) else {
            return 0;
        };
        let mut remaining = max_images;
        let mut dropped = 0;

        for record in conv.records.iter_mut().rev() {
            let count = record.attachment_refs.len();
            if count <= remaining {
                remaining -= count;
            } else {
                dropped += count - remaining;
                record.attachment_refs.truncate(remaining);
                remaining = 0;
            }
        }

        if dropped > 0 {
            debug!(conversation = %key, dropped, "trimmed cached images");
        }
        dropped
    }

    /// Remove every image reference `keep` rejects. Returns how many went.
    pub fn retain_images(
        &self,
        key: &ConversationKey,
        mut keep: impl FnMut(&ImageRef) -> bool,
    ) -> usize {
        let Some(mut conv) = self.conversations.get_mut(key) else {
            return 0;
        };
        let mut dropped = 0;
        for record in conv.records.iter_mut() {
            let before = record.attachment_refs.len();
            record.attachment_refs.retain(|img| keep(img));
            dropped += before - record.attachment_refs.len();
        }
        dropped
    }

    /// Copy of the conversation in arrival order.
    pub fn snapshot(&self, key: &ConversationKey) -> Vec<MessageRecord> {
        self.conversations
            .get(key)
            .map(|c| c.records.iter().cloned().collect())
            .unwrap_or_default()
    }
}
