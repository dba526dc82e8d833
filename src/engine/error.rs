use ulid::Ulid;

use crate::model::{format_timestamp, Ms};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    InvalidInput(String),
    MalformedInterval { start: Ms, end: Ms },
    NotFound(Ulid),
    LimitExceeded(&'static str),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            EngineError::MalformedInterval { start, end } => write!(
                f,
                "invalid input: end time {} is not after start time {}",
                format_timestamp(*end),
                format_timestamp(*start)
            ),
            EngineError::NotFound(id) => write!(f, "event not found: {id}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl EngineError {
    /// Whether the caller sent something the engine cannot evaluate.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, EngineError::InvalidInput(_) | EngineError::MalformedInterval { .. })
    }
}
