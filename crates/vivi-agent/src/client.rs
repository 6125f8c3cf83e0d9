use std::time::Duration;

use tracing::{info, warn};

use crate::provider::{ChatRequest, LlmProvider, Message};

/// Attempts per completion before giving up.
pub const MAX_ATTEMPTS: u32 = 3;
/// Fixed pause between attempts.
pub const RETRY_DELAY: Duration = Duration::from_secs(3);

/// Wraps a provider with bounded retry and a static fallback reply.
///
/// `complete` never fails: after [`MAX_ATTEMPTS`] transport or protocol
/// errors it returns the configured fallback text instead.
pub struct CompletionClient {
    provider: Box<dyn LlmProvider>,
    model: String,
    max_tokens: u32,
    fallback: String,
    max_attempts: u32,
    retry_delay: Duration,
}

impl CompletionClient {
    pub fn new(
        provider: Box<dyn LlmProvider>,
        model: String,
        max_tokens: u32,
        fallback: String,
    ) -> Self {
        Self {
            provider,
            model,
            max_tokens,
            fallback,
            max_attempts: MAX_ATTEMPTS,
            retry_delay: RETRY_DELAY,
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    /// One logical completion for an ordered, role-tagged conversation.
    pub async fn complete(&self, messages: Vec<Message>) -> String {
        let req = ChatRequest {
            model: self.model.clone(),
            messages,
            max_tokens: self.max_tokens,
        };
        let provider_name = self.provider.name();

        for attempt in 1..=self.max_attempts {
            match self.provider.send(&req).await {
                Ok(resp) => {
                    info!(
                        provider = %provider_name,
                        model = %resp.model,
                        attempt,
                        tokens_in = resp.tokens_in,
                        tokens_out = resp.tokens_out,
                        "completion received"
                    );
                    return resp.content;
                }
                Err(e) => {
                    warn!(provider = %provider_name, attempt, err = %e, "completion failed");
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        warn!(
            provider = %provider_name,
            attempts = self.max_attempts,
            "completion attempts exhausted, using fallback reply"
        );
        self.fallback.clone()
    }
}
