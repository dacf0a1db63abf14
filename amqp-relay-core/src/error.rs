// amqp-relay-core/src/error.rs
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("channel error (code {}): {reason}", display_code(.code))]
    Channel { code: Option<u16>, reason: String },

    #[error("exchange declaration error for '{exchange}': {reason}")]
    Declaration { exchange: String, reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("publish error: {0}")]
    Publish(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl RelayError {
    /// AMQP reply code carried by a channel fault, if the broker sent one.
    pub fn code(&self) -> Option<u16> {
        match self {
            RelayError::Channel { code, .. } => *code,
            _ => None,
        }
    }
}

fn display_code(code: &Option<u16>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}
