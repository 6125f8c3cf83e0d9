use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::provider::{ChatRequest, ChatResponse, LlmProvider, ProviderError};

/// Any endpoint speaking the OpenAI chat-completions protocol: OpenAI itself
/// or a local server (llama.cpp, LM Studio, vLLM) via `base_url`.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        let base_url = base_url
            .unwrap_or_else(|| "https://api.openai.com".to_string())
            .trim_end_matches('/')
            .to_string();
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let body = build_request_body(req);
        let url = format!("{}/v1/chat/completions", self.base_url);

        debug!(model = %req.model, messages = req.messages.len(), "sending completion request");

        let mut builder = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(&body);
        // Local servers usually run without auth.
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }
        let resp = builder.send().await?;

        let status = resp.status().as_u16();
        if status == 429 {
            let retry = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|s| s * 1000) // convert seconds to ms
                .unwrap_or(5000);
            return Err(ProviderError::RateLimited {
                retry_after_ms: retry,
            });
        }

        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "completion API error");
            return Err(ProviderError::Api {
                status,
                message: text,
            });
        }

        let api_resp: ApiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        parse_response(api_resp)
    }
}

fn build_request_body(req: &ChatRequest) -> serde_json::Value {
    serde_json::json!({
        "model": req.model,
        "messages": req.messages,
        "max_tokens": req.max_tokens,
    })
}

fn parse_response(resp: ApiResponse) -> Result<ChatResponse, ProviderError> {
    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Parse("response has no choices".to_string()))?;
    let content = choice
        .message
        .content
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ProviderError::Parse("empty completion".to_string()))?;

    Ok(ChatResponse {
        content,
        model: resp.model,
        tokens_in: resp.usage.as_ref().map(|u| u.prompt_tokens).unwrap_or(0),
        tokens_out: resp
            .usage
            .as_ref()
            .map(|u| u.completion_tokens)
            .unwrap_or(0),
        stop_reason: choice.finish_reason.unwrap_or_default(),
    })
}

// OpenAI API response types (private, deserialization only)

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
