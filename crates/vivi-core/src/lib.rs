pub mod config;
pub mod error;
pub mod types;

pub use config::ViviConfig;
pub use error::{Result, ViviError};
pub use types::{Author, ConversationKey, ImageRef, MessageRecord};
