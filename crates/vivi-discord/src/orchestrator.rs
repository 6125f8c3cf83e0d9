//! Per-message pipeline: filter → command check → buffer → trigger →
//! prompt → completion → post-process → chunked dispatch.

use std::collections::HashSet;
use std::sync::OnceLock;

use tracing::{debug, info, warn};

use vivi_agent::text::{stylize, ReplyCleaner};
use vivi_agent::CompletionClient;
use vivi_core::config::ChatConfig;
use vivi_core::{Author, ConversationKey, ImageRef, MessageRecord, ViviError};

use crate::attach;
use crate::buffer::ContextBuffer;
use crate::commands::Command;
use crate::error::DiscordError;
use crate::prompt;
use crate::send::{split_chunks, Outbound};
use crate::trigger::{TriggerPolicy, TriggerReason};

/// The fields of a platform message the pipeline depends on.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub message_id: u64,
    pub guild_id: Option<u64>,
    pub channel_id: u64,
    pub author: Author,
    pub content: String,
    /// Whether the bot user is in the message's mention set.
    pub mentions_bot: bool,
    /// Display name of the author of the referenced message, if resolved.
    pub reply_author: Option<String>,
    pub images: Vec<ImageRef>,
}

impl InboundMessage {
    pub fn conversation_key(&self) -> ConversationKey {
        ConversationKey::new(self.guild_id, self.channel_id)
    }
}

/// How an inbound message was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// From the bot itself, or blank.
    Ignored,
    /// A recognized command; the caller runs it.
    Command(Command),
    /// Stored for context, no reply warranted.
    Buffered,
    Responded {
        reason: TriggerReason,
        chunks: usize,
    },
    /// A reply was attempted but sending failed. Buffer state is kept.
    DispatchFailed,
}

/// Owns the conversation buffer and drives replies.
///
/// Constructed once at startup and shared behind an `Arc`.
pub struct Orchestrator {
    buffer: ContextBuffer,
    client: CompletionClient,
    cleaner: ReplyCleaner,
    policy: TriggerPolicy,
    chat: ChatConfig,
    command_prefix: String,
    bot_id: OnceLock<u64>,
    http: reqwest::Client,
}

impl Orchestrator {
    pub fn new(
        chat: ChatConfig,
        command_prefix: String,
        client: CompletionClient,
    ) -> Result<Self, ViviError> {
        let cleaner = ReplyCleaner::new(&chat.persona_name)
            .map_err(|e| ViviError::Config(format!("chat.persona_name: {e}")))?;
        Ok(Self {
            buffer: ContextBuffer::new(),
            client,
            cleaner,
            policy: TriggerPolicy::from_config(&chat),
            chat,
            command_prefix,
            bot_id: OnceLock::new(),
            http: reqwest::Client::new(),
        })
    }

    /// Record the bot's own user id once the gateway reports it.
    pub fn set_bot_id(&self, id: u64) {
        if self.bot_id.set(id).is_err() {
            debug!(id, "bot id already set");
        }
    }

    pub fn bot_id(&self) -> Option<u64> {
        self.bot_id.get().copied()
    }

    pub fn buffer(&self) -> &ContextBuffer {
        &self.buffer
    }

    pub fn chat(&self) -> &ChatConfig {
        &self.chat
    }

    /// Administrative hook: forget one conversation.
    pub fn clear(&self, key: &ConversationKey) -> bool {
        let cleared = self.buffer.clear(key);
        info!(conversation = %key, cleared, "conversation cleared");
        cleared
    }

    pub async fn handle(&self, msg: InboundMessage, out: &dyn Outbound) -> Disposition {
        if msg.author.is_bot() || msg.content.trim().is_empty() {
            return Disposition::Ignored;
        }

        if let Some(command) = Command::parse(&msg.content, &self.command_prefix) {
            return Disposition::Command(command);
        }

        let key = msg.conversation_key();
        let mentioned = msg.mentions_bot;
        let content = if mentioned {
            self.strip_mention(&msg.content)
        } else {
            msg.content.clone()
        };

        // Appends happen before the first await so arrival order holds.
        let author_name = match &msg.author {
            Author::External { name, .. } => Some(name.clone()),
            Author::Bot => None,
        };
        let record = MessageRecord::new(msg.author.clone(), content.as_str())
            .with_reply_target(msg.reply_author.clone())
            .with_images(msg.images.clone());
        self.buffer.append(&key, record);
        self.buffer
            .trim_attachment_count(&key, self.chat.max_cached_images);

        let cached = self.buffer.total_text_size(&key);
        let decision = self
            .policy
            .evaluate(mentioned, cached, &content, msg.channel_id);
        // Quiet channels never reach `respond`; cap them here.
        self.buffer.trim_to_budget(&key, self.retention_limit());

        let Some(reason) = decision else {
            debug!(conversation = %key, cached, "buffered without reply");
            return Disposition::Buffered;
        };

        info!(conversation = %key, ?reason, cached, "reply triggered");

        let reply_target = if mentioned { author_name } else { None };
        match self
            .respond(&key, &msg, reason, reply_target, out)
            .await
        {
            Ok(chunks) => Disposition::Responded { reason, chunks },
            Err(e) => {
                warn!(conversation = %key, error = %e, "reply dispatch failed");
                Disposition::DispatchFailed
            }
        }
    }

    async fn respond(
        &self,
        key: &ConversationKey,
        msg: &InboundMessage,
        reason: TriggerReason,
        reply_target: Option<String>,
        out: &dyn Outbound,
    ) -> Result<usize, DiscordError> {
        if let Err(e) = out.typing(msg.channel_id).await {
            warn!(conversation = %key, error = %e, "typing indicator failed");
        }

        self.buffer.trim_to_budget(key, self.chat.send_limit);
        if self.chat.verify_images {
            self.drop_unreachable_images(key).await;
        }
        let records = self.buffer.snapshot(key);
        let messages = prompt::build(&self.chat.persona, &self.chat.persona_name, &records);

        let raw = self.client.complete(messages).await;
        let mut cleaned = self.cleaner.clean(&raw);
        if cleaned.is_empty() {
            warn!(conversation = %key, "completion was empty after cleanup, using fallback");
            cleaned = self.client.fallback().to_string();
        }

        // The trigger message's raw text decides the style; the buffer keeps
        // the clean form so future prompts never see it.
        let styled = stylize(&cleaned, &msg.content, self.chat.stylize);
        self.buffer.append(
            key,
            MessageRecord::new(Author::Bot, cleaned).with_reply_target(reply_target),
        );

        let chunks = split_chunks(&styled, self.chat.character_limit);
        let quote = reason == TriggerReason::Mention;
        for (i, chunk) in chunks.iter().enumerate() {
            let reply_to = (i == 0 && quote).then_some(msg.message_id);
            out.send(msg.channel_id, chunk, reply_to).await?;
        }

        debug!(conversation = %key, chunks = chunks.len(), "reply sent");
        Ok(chunks.len())
    }

    /// Most characters a conversation keeps, whether or not it is answered.
    ///
    /// Twice the larger of the prompt budget and the keyword threshold, so
    /// neither the next prompt nor the next trigger decision loses context.
    fn retention_limit(&self) -> usize {
        self.chat
            .send_limit
            .max(self.chat.message_threshold)
            .saturating_mul(2)
    }

    /// HEAD-probe the images about to go into a prompt and drop the dead ones
    /// from the buffer. Runs after the inbound record is appended, so probing
    /// never reorders a conversation.
    async fn drop_unreachable_images(&self, key: &ConversationKey) {
        let mut seen = HashSet::new();
        let pending: Vec<ImageRef> = self
            .buffer
            .snapshot(key)
            .into_iter()
            .flat_map(|r| r.attachment_refs)
            .filter(|img| seen.insert(img.url().to_string()))
            .collect();
        if pending.is_empty() {
            return;
        }

        let valid: HashSet<String> = attach::verify(&self.http, pending)
            .await
            .into_iter()
            .map(|img| img.0)
            .collect();
        let rejected: HashSet<String> = seen.difference(&valid).cloned().collect();
        if rejected.is_empty() {
            return;
        }
        let dropped = self
            .buffer
            .retain_images(key, |img| !rejected.contains(img.url()));
        debug!(conversation = %key, dropped, "dropped unreachable images");
    }

    /// Remove `<@id>` / `<@!id>` tokens addressing the bot.
    fn strip_mention(&self, content: &str) -> String {
        match self.bot_id() {
            Some(id) => content
                .replace(&format!("<@{id}>"), "")
                .replace(&format!("<@!{id}>"), "")
                .trim()
                .to_string(),
            None => content.trim().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use vivi_agent::{ChatRequest, ChatResponse, LlmProvider, ProviderError};

    const BOT: u64 = 42;

    struct Echo;

    #[async_trait]
    impl LlmProvider for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            Ok(ChatResponse {
                content: format!("{} turns -sent by Vivi#5153", req.messages.len()),
                model: req.model.clone(),
                tokens_in: 0,
                tokens_out: 0,
                stop_reason: "stop".into(),
            })
        }
    }

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(String, Option<u64>)>>,
    }

    #[async_trait]
    impl Outbound for Recorder {
        async fn typing(&self, _channel_id: u64) -> Result<(), DiscordError> {
            Err(DiscordError::Serenity(serenity::Error::Other("no typing in tests")))
        }
        async fn send(
            &self,
            _channel_id: u64,
            text: &str,
            reply_to: Option<u64>,
        ) -> Result<(), DiscordError> {
            self.sent.lock().unwrap().push((text.to_string(), reply_to));
            Ok(())
        }
    }

    fn orchestrator() -> Orchestrator {
        orchestrator_with(ChatConfig {
            stylize: false,
            ..ChatConfig::default()
        })
    }

    fn orchestrator_with(chat: ChatConfig) -> Orchestrator {
        let client = CompletionClient::new(Box::new(Echo), "m".into(), 64, "sorry".into())
            .with_retry_delay(Duration::ZERO);
        let orch = Orchestrator::new(chat, "$".into(), client).unwrap();
        orch.set_bot_id(BOT);
        orch
    }

    fn inbound(content: &str, mentions_bot: bool) -> InboundMessage {
        InboundMessage {
            message_id: 7,
            guild_id: Some(1),
            channel_id: 2,
            author: Author::external(3, "amy"),
            content: content.to_string(),
            mentions_bot,
            reply_author: None,
            images: Vec::new(),
        }
    }

    #[tokio::test]
    async fn own_and_blank_messages_are_ignored() {
        let orch = orchestrator();
        let out = Recorder::default();
        let mut own = inbound("hello", false);
        own.author = Author::Bot;
        assert_eq!(orch.handle(own, &out).await, Disposition::Ignored);
        assert_eq!(orch.handle(inbound("   ", true), &out).await, Disposition::Ignored);
        assert!(orch.buffer().is_empty(&ConversationKey::new(Some(1), 2)));
    }

    #[tokio::test]
    async fn commands_bypass_the_buffer() {
        let orch = orchestrator();
        let out = Recorder::default();
        assert_eq!(
            orch.handle(inbound("$clear", false), &out).await,
            Disposition::Command(Command::Clear)
        );
        assert!(orch.buffer().is_empty(&ConversationKey::new(Some(1), 2)));
    }

    #[tokio::test]
    async fn mention_is_stripped_and_answered() {
        let orch = orchestrator();
        let out = Recorder::default();
        let d = orch.handle(inbound("<@42> hello", true), &out).await;
        assert_eq!(
            d,
            Disposition::Responded {
                reason: TriggerReason::Mention,
                chunks: 1
            }
        );

        let records = orch.buffer().snapshot(&ConversationKey::new(Some(1), 2));
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].content, "hello");
        // system + one user turn, cleaned of the signature
        assert_eq!(records[1].content, "2 turns");
        assert_eq!(records[1].author, Author::Bot);
        assert_eq!(records[1].reply_target.as_deref(), Some("amy"));

        let sent = out.sent.lock().unwrap();
        assert_eq!(sent.as_slice(), [("2 turns".to_string(), Some(7))]);
    }

    #[tokio::test]
    async fn nickname_mention_is_stripped() {
        let orch = orchestrator();
        let out = Recorder::default();
        let d = orch.handle(inbound("<@!42>  hey there ", true), &out).await;
        assert!(matches!(d, Disposition::Responded { .. }));

        let records = orch.buffer().snapshot(&ConversationKey::new(Some(1), 2));
        assert_eq!(records[0].content, "hey there");
    }

    #[tokio::test]
    async fn other_users_mentions_are_kept() {
        let orch = orchestrator();
        let out = Recorder::default();
        orch.handle(inbound("<@42> say hi to <@!99>", true), &out).await;

        let records = orch.buffer().snapshot(&ConversationKey::new(Some(1), 2));
        assert_eq!(records[0].content, "say hi to <@!99>");
    }

    #[tokio::test]
    async fn quiet_conversation_stays_bounded() {
        let chat = ChatConfig {
            stylize: false,
            send_limit: 100,
            message_threshold: 50,
            ..ChatConfig::default()
        };
        let orch = orchestrator_with(chat);
        let out = Recorder::default();
        let key = ConversationKey::new(Some(1), 2);

        for i in 0..2_000 {
            let text = format!("just chatting along, line {i:05} ok");
            assert_eq!(orch.handle(inbound(&text, false), &out).await, Disposition::Buffered);
        }

        assert!(orch.buffer().total_text_size(&key) <= 200);
        assert!(orch.buffer().len(&key) < 10);
        // newest message survives
        let records = orch.buffer().snapshot(&key);
        assert!(records.last().is_some_and(|r| r.content.contains("01999")));
        assert!(out.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreachable_images_are_dropped_before_prompting() {
        let chat = ChatConfig {
            stylize: false,
            verify_images: true,
            ..ChatConfig::default()
        };
        let orch = orchestrator_with(chat);
        let out = Recorder::default();
        let key = ConversationKey::new(Some(1), 2);

        let mut first = inbound("look at this", false);
        first.images = vec![ImageRef("http://127.0.0.1:9/cat.png".into())];
        assert_eq!(orch.handle(first, &out).await, Disposition::Buffered);
        // buffered as received, in order, before any probing
        assert_eq!(orch.buffer().snapshot(&key)[0].attachment_refs.len(), 1);

        orch.handle(inbound("<@42> cute right", true), &out).await;
        let records = orch.buffer().snapshot(&key);
        assert_eq!(records[0].content, "look at this");
        assert!(records[0].attachment_refs.is_empty());
    }

    #[tokio::test]
    async fn images_are_kept_without_verification() {
        let orch = orchestrator();
        let out = Recorder::default();
        let mut msg = inbound("<@42> look", true);
        msg.images = vec![ImageRef("http://127.0.0.1:9/cat.png".into())];
        orch.handle(msg, &out).await;

        let records = orch.buffer().snapshot(&ConversationKey::new(Some(1), 2));
        assert_eq!(records[0].attachment_refs.len(), 1);
    }

    #[tokio::test]
    async fn quiet_message_is_only_buffered() {
        let orch = orchestrator();
        let out = Recorder::default();
        assert_eq!(orch.handle(inbound("hi all", false), &out).await, Disposition::Buffered);
        assert!(out.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn clear_hook_reports_state() {
        let orch = orchestrator();
        let key = ConversationKey::new(Some(1), 2);
        orch.buffer().append(&key, MessageRecord::new(Author::external(1, "a"), "x"));
        assert!(orch.clear(&key));
        assert!(!orch.clear(&key));
    }
}
