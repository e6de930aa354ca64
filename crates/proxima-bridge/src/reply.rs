//! Results handed back to bridge callers

use proxima_core::{ErrorKind, LinkError};
use proxima_discovery::PeerRecord;
use serde::Serialize;
use serde_json::Value;

/// Outcome class of a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplyStatus {
    /// Operation succeeded
    Ok,
    /// Operation failed
    Error,
    /// The options could not be used
    JsonError,
}

/// One result delivered to the caller
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    /// Outcome class
    pub status: ReplyStatus,
    /// Result value or error message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// More replies will follow on the same callback
    pub keep_callback: bool,
}

impl Reply {
    /// Success without a value
    #[must_use]
    pub fn ok() -> Self {
        Self {
            status: ReplyStatus::Ok,
            payload: None,
            keep_callback: false,
        }
    }

    /// Success carrying `payload`
    #[must_use]
    pub fn ok_with(payload: impl Into<Value>) -> Self {
        Self {
            payload: Some(payload.into()),
            ..Self::ok()
        }
    }

    /// Failure with a message
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Error,
            payload: Some(Value::String(message.into())),
            keep_callback: false,
        }
    }

    /// Unusable options
    #[must_use]
    pub fn json_error(message: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::JsonError,
            payload: Some(Value::String(message.into())),
            keep_callback: false,
        }
    }

    /// Keep the caller's callback registered
    #[must_use]
    pub fn keep(mut self) -> Self {
        self.keep_callback = true;
        self
    }

    /// Whether this reply reports success
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == ReplyStatus::Ok
    }

    /// Payload as text, if it is a string
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.payload.as_ref().and_then(Value::as_str)
    }
}

impl From<LinkError> for Reply {
    fn from(err: LinkError) -> Self {
        match err.kind() {
            ErrorKind::Validation => Reply::json_error(err.to_string()),
            ErrorKind::NotFound | ErrorKind::Transport | ErrorKind::Io | ErrorKind::State => {
                Reply::error(err.to_string())
            }
        }
    }
}

/// A discovered peer as callers see it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerInfo {
    /// Display name, also used as the connect address
    pub name: String,
    /// Host address, or "unknown"
    pub address: String,
}

impl From<&PeerRecord> for PeerInfo {
    fn from(record: &PeerRecord) -> Self {
        Self {
            name: record.display_name.clone(),
            address: record.host_address.clone(),
        }
    }
}
