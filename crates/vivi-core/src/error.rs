use thiserror::Error;

#[derive(Debug, Error)]
pub enum ViviError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("LLM provider error: {0}")]
    LlmProvider(String),
}

impl ViviError {
    /// Short error code string, used as a structured log field.
    pub fn code(&self) -> &'static str {
        match self {
            ViviError::Config(_) => "CONFIG_ERROR",
            ViviError::LlmProvider(_) => "LLM_PROVIDER_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, ViviError>;
