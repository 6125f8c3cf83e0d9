pub mod client;
pub mod openai;
pub mod provider;
pub mod text;

pub use client::CompletionClient;
pub use openai::OpenAiProvider;
pub use provider::{
    ChatRequest, ChatResponse, Content, ContentPart, LlmProvider, Message, ProviderError, Role,
};
