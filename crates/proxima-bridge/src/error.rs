//! Command parsing errors

use thiserror::Error;

/// Errors raised while turning an action name and its arguments into a
/// [`Command`](crate::Command)
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Action name is not one the bridge knows
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    /// Arguments are not valid JSON or do not match the option shape
    #[error("Malformed options: {0}")]
    Json(#[from] serde_json::Error),

    /// Options decoded but carry an unusable value
    #[error("Invalid option: {0}")]
    InvalidOption(String),
}

impl BridgeError {
    /// Whether the failure came from the option payload rather than the action
    #[must_use]
    pub fn is_json(&self) -> bool {
        matches!(self, BridgeError::Json(_) | BridgeError::InvalidOption(_))
    }
}

/// Result type for command parsing
pub type Result<T> = std::result::Result<T, BridgeError>;
