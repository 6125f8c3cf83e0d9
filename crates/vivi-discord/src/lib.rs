pub mod adapter;
pub mod attach;
pub mod buffer;
pub mod commands;
pub mod error;
pub mod handler;
pub mod orchestrator;
pub mod presence;
pub mod prompt;
pub mod send;
pub mod trigger;

pub use adapter::DiscordAdapter;
pub use buffer::ContextBuffer;
pub use error::DiscordError;
pub use orchestrator::{Disposition, InboundMessage, Orchestrator};
pub use send::Outbound;
