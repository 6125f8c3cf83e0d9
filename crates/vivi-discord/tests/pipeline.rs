// End-to-end behaviour of the reply pipeline, driven through in-memory
// provider and outbound fakes.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use vivi_agent::{ChatRequest, ChatResponse, CompletionClient, LlmProvider, ProviderError, Role};
use vivi_core::config::ChatConfig;
use vivi_core::{Author, ConversationKey};
use vivi_discord::trigger::TriggerReason;
use vivi_discord::{DiscordError, Disposition, InboundMessage, Orchestrator, Outbound};

const BOT_ID: u64 = 4242;
const GUILD: u64 = 1;
const DESIGNATED: u64 = 10;
const OTHER: u64 = 20;
const SORRY: &str = "Sorry I am kinda sleepy right now, can you ask me later?";

/// Answers with a fixed reply and remembers every request.
struct Scripted {
    reply: Option<String>,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
}

#[async_trait]
impl LlmProvider for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        self.requests.lock().unwrap().push(req.clone());
        match &self.reply {
            Some(text) => Ok(ChatResponse {
                content: text.clone(),
                model: req.model.clone(),
                tokens_in: 0,
                tokens_out: 0,
                stop_reason: "stop".to_string(),
            }),
            None => Err(ProviderError::Unavailable("down".to_string())),
        }
    }
}

#[derive(Default)]
struct Sent {
    messages: Mutex<Vec<(u64, String, Option<u64>)>>,
    fail_sends: bool,
}

#[async_trait]
impl Outbound for Sent {
    async fn typing(&self, _channel_id: u64) -> Result<(), DiscordError> {
        Ok(())
    }

    async fn send(
        &self,
        channel_id: u64,
        text: &str,
        reply_to: Option<u64>,
    ) -> Result<(), DiscordError> {
        if self.fail_sends {
            return Err(DiscordError::Serenity(serenity::Error::Other("channel gone")));
        }
        self.messages
            .lock()
            .unwrap()
            .push((channel_id, text.to_string(), reply_to));
        Ok(())
    }
}

struct Harness {
    orch: Orchestrator,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
}

fn harness(reply: Option<&str>, chat: ChatConfig) -> Harness {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let provider = Scripted {
        reply: reply.map(String::from),
        requests: Arc::clone(&requests),
    };
    let client = CompletionClient::new(Box::new(provider), "test".into(), 256, SORRY.into())
        .with_retry_delay(Duration::ZERO);
    let orch = Orchestrator::new(chat, "$".into(), client).unwrap();
    orch.set_bot_id(BOT_ID);
    Harness { orch, requests }
}

fn chat() -> ChatConfig {
    ChatConfig {
        message_threshold: 20,
        designated_channels: vec![DESIGNATED],
        stylize: false,
        ..ChatConfig::default()
    }
}

fn message(id: u64, channel: u64, content: &str, mentions_bot: bool) -> InboundMessage {
    InboundMessage {
        message_id: id,
        guild_id: Some(GUILD),
        channel_id: channel,
        author: Author::external(7, "amy"),
        content: content.to_string(),
        mentions_bot,
        reply_author: None,
        images: Vec::new(),
    }
}

fn key(channel: u64) -> ConversationKey {
    ConversationKey::new(Some(GUILD), channel)
}

#[tokio::test]
async fn mention_on_empty_buffer_sends_single_user_turn() {
    let h = harness(Some("hi amy!"), chat());
    let out = Sent::default();

    let d = h
        .orch
        .handle(message(1, OTHER, "<@4242> hello", true), &out)
        .await;
    assert!(matches!(d, Disposition::Responded { reason: TriggerReason::Mention, .. }));

    let requests = h.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let roles: Vec<Role> = requests[0].messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, [Role::System, Role::User]);
    assert_eq!(requests[0].messages[1].content.text(), "hello -sent by amy");

    let sent = out.messages.lock().unwrap();
    assert_eq!(sent.as_slice(), [(OTHER, "hi amy!".to_string(), Some(1))]);
}

#[tokio::test]
async fn keyword_trigger_is_gated_by_designated_channels() {
    let text = "ok so why does this keep happening to me";

    let h = harness(Some("because"), chat());
    let out = Sent::default();
    assert_eq!(h.orch.handle(message(1, OTHER, text, false), &out).await, Disposition::Buffered);
    assert!(out.messages.lock().unwrap().is_empty());

    let d = h.orch.handle(message(2, DESIGNATED, text, false), &out).await;
    assert_eq!(
        d,
        Disposition::Responded {
            reason: TriggerReason::Keyword,
            chunks: 1
        }
    );
    // ambient replies never quote the trigger
    let sent = out.messages.lock().unwrap();
    assert_eq!(sent.as_slice(), [(DESIGNATED, "because".to_string(), None)]);
}

#[tokio::test]
async fn keyword_below_threshold_stays_quiet() {
    let h = harness(Some("because"), chat());
    let out = Sent::default();
    let d = h.orch.handle(message(1, DESIGNATED, "why", false), &out).await;
    assert_eq!(d, Disposition::Buffered);
}

#[tokio::test]
async fn long_reply_is_chunked_and_only_first_chunk_quotes() {
    let long = "x".repeat(4500);
    let h = harness(Some(long.as_str()), chat());
    let out = Sent::default();

    let d = h.orch.handle(message(9, OTHER, "<@4242> essay pls", true), &out).await;
    assert_eq!(
        d,
        Disposition::Responded {
            reason: TriggerReason::Mention,
            chunks: 3
        }
    );

    let sent = out.messages.lock().unwrap();
    let lens: Vec<usize> = sent.iter().map(|(_, t, _)| t.chars().count()).collect();
    assert_eq!(lens, [2000, 2000, 500]);
    let refs: Vec<Option<u64>> = sent.iter().map(|(_, _, r)| *r).collect();
    assert_eq!(refs, [Some(9), None, None]);
}

#[tokio::test]
async fn upstream_failure_degrades_to_apology() {
    let h = harness(None, chat());
    let out = Sent::default();

    h.orch.handle(message(1, OTHER, "<@4242> you there?", true), &out).await;

    assert_eq!(h.requests.lock().unwrap().len(), 3);
    let sent = out.messages.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1, SORRY);
}

#[tokio::test]
async fn buffer_sees_clean_text_while_channel_sees_style() {
    let chat = ChatConfig {
        stylize: true,
        ..chat()
    };
    let h = harness(Some("really lovely -sent by Vivi#5153"), chat);
    let out = Sent::default();

    h.orch.handle(message(1, OTHER, "<@4242> uwu talk to me", true), &out).await;

    let records = h.orch.buffer().snapshot(&key(OTHER));
    assert_eq!(records.last().map(|r| r.content.as_str()), Some("really lovely"));
    assert!(records.last().is_some_and(|r| r.author == Author::Bot));

    let sent = out.messages.lock().unwrap();
    assert!(sent[0].1.contains("wuvwy"), "{}", sent[0].1);
}

#[tokio::test]
async fn reply_turns_become_assistant_context() {
    let h = harness(Some("sure"), chat());
    let out = Sent::default();

    h.orch.handle(message(1, OTHER, "<@4242> first", true), &out).await;
    h.orch.handle(message(2, OTHER, "<@4242> second", true), &out).await;

    let requests = h.requests.lock().unwrap();
    let roles: Vec<Role> = requests[1].messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, [Role::System, Role::User, Role::Assistant, Role::User]);
    assert_eq!(
        requests[1].messages[2].content.text(),
        "sure -sent by Vivi (replying to \"amy\")"
    );
}

#[tokio::test]
async fn context_is_trimmed_to_send_limit_before_prompting() {
    let chat = ChatConfig {
        send_limit: 30,
        ..chat()
    };
    let h = harness(Some("ok"), chat);
    let out = Sent::default();

    for i in 0..5 {
        h.orch
            .handle(message(i, OTHER, &format!("filler message {i}"), false), &out)
            .await;
    }
    h.orch.handle(message(9, OTHER, "<@4242> recap?", true), &out).await;

    let requests = h.requests.lock().unwrap();
    let turns: Vec<String> = requests[0].messages[1..]
        .iter()
        .map(|m| m.content.text())
        .collect();
    // "filler message 4" (16) + "recap?" (6) fit in 30; older ones are gone
    assert_eq!(
        turns,
        ["filler message 4 -sent by amy", "recap? -sent by amy"]
    );
}

#[tokio::test]
async fn failed_send_keeps_buffer_and_reports() {
    let h = harness(Some("hello"), chat());
    let out = Sent {
        fail_sends: true,
        ..Sent::default()
    };

    let d = h.orch.handle(message(1, OTHER, "<@4242> hi", true), &out).await;
    assert_eq!(d, Disposition::DispatchFailed);
    // inbound and reply were both buffered before the send failed
    assert_eq!(h.orch.buffer().len(&key(OTHER)), 2);
}

#[tokio::test]
async fn clear_after_five_messages() {
    let h = harness(Some("ok"), chat());
    let out = Sent::default();
    for i in 0..5 {
        h.orch.handle(message(i, OTHER, "chatter", false), &out).await;
    }
    assert_eq!(h.orch.buffer().len(&key(OTHER)), 5);

    assert!(h.orch.clear(&key(OTHER)));
    assert_eq!(h.orch.buffer().total_text_size(&key(OTHER)), 0);
    assert!(!h.orch.clear(&key(OTHER)));
}

#[tokio::test]
async fn conversations_do_not_bleed_into_each_other() {
    let h = harness(Some("ok"), chat());
    let out = Sent::default();

    h.orch.handle(message(1, DESIGNATED, "secret stuff", false), &out).await;
    h.orch.handle(message(2, OTHER, "<@4242> hey", true), &out).await;

    let requests = h.requests.lock().unwrap();
    assert_eq!(requests[0].messages.len(), 2);
    assert!(!requests[0].messages[1].content.text().contains("secret"));
}
