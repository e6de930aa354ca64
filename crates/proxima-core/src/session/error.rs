//! Error types for the Session API
//!
//! Every fault a caller can observe is one `LinkError` variant. Errors are
//! grouped into coarse kinds so callers can tell a bad request from a radio
//! fault without matching on every variant.
//!
//! # Example
//!
//! ```no_run
//! use proxima_core::session::{ErrorKind, LinkError};
//!
//! fn report(err: &LinkError) {
//!     match err.kind() {
//!         ErrorKind::Validation => println!("fix the request: {err}"),
//!         _ if err.is_benign() => {}
//!         _ => println!("link fault: {err}"),
//!     }
//! }
//! ```

use proxima_discovery::{AdapterState, DiscoveryError};
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

/// Coarse classification of a [`LinkError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request itself is malformed
    Validation,
    /// The requested peer or peers do not exist
    NotFound,
    /// The radio faulted
    Transport,
    /// The stream failed while reading
    Io,
    /// The operation does not fit the current session state
    State,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Transport => "transport",
            ErrorKind::Io => "io",
            ErrorKind::State => "state",
        };
        f.write_str(name)
    }
}

/// Errors that can occur in Session operations
#[derive(Debug, Error, Clone)]
pub enum LinkError {
    // ============ Validation Errors ============
    /// Request is missing a required field or is otherwise malformed
    #[error("Invalid request: {0}")]
    InvalidRequest(Cow<'static, str>),

    /// Send was called with an empty payload
    #[error("Message is empty")]
    EmptyPayload,

    /// Session configuration is invalid
    #[error("Invalid configuration: {0}")]
    InvalidConfig(Cow<'static, str>),

    // ============ Lookup Errors ============
    /// Target display name is not in the latest discovery snapshot
    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    /// Discovery completed with an empty snapshot
    #[error("No devices were found")]
    NoDevicesFound,

    // ============ Transport Errors ============
    /// Radio faulted during discovery
    #[error("Discovery failed: {0}")]
    DiscoveryFailed(Cow<'static, str>),

    /// Radio faulted while starting to advertise
    #[error("Advertising failed: {0}")]
    AdvertisingFailed(Cow<'static, str>),

    /// Opening the connection failed
    #[error("Connection failed: {0}")]
    ConnectFailed(Cow<'static, str>),

    /// Releasing the connection or re-advertising failed
    #[error("Disconnect failed: {0}")]
    DisconnectFailed(Cow<'static, str>),

    /// Writing a message failed
    #[error("Send failed: {0}")]
    SendFailed(Cow<'static, str>),

    /// Completing an inbound connection request failed
    #[error("Error occurred while processing incoming request: {0}")]
    AcceptFailed(Cow<'static, str>),

    /// The platform cannot show its radio settings
    #[error("Settings unavailable: {0}")]
    SettingsUnavailable(Cow<'static, str>),

    // ============ I/O Errors ============
    /// Reading from the connection failed
    #[error("I/O failure: {0}")]
    Io(Cow<'static, str>),

    // ============ State Errors ============
    /// No connection is open
    #[error("No active connection")]
    NoConnection,

    /// A listen loop is already running
    #[error("Already listening")]
    AlreadyListening,

    /// Adapter did not reach the requested state after the settings round trip
    #[error("Adapter is {actual}, expected {requested}")]
    AdapterStateMismatch {
        /// State that was asked for
        requested: AdapterState,
        /// State observed afterwards
        actual: AdapterState,
    },
}

impl LinkError {
    /// Classify this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            LinkError::InvalidRequest(_) | LinkError::EmptyPayload | LinkError::InvalidConfig(_) => {
                ErrorKind::Validation
            }
            LinkError::PeerNotFound(_) | LinkError::NoDevicesFound => ErrorKind::NotFound,
            LinkError::DiscoveryFailed(_)
            | LinkError::AdvertisingFailed(_)
            | LinkError::ConnectFailed(_)
            | LinkError::DisconnectFailed(_)
            | LinkError::SendFailed(_)
            | LinkError::AcceptFailed(_)
            | LinkError::SettingsUnavailable(_) => ErrorKind::Transport,
            LinkError::Io(_) => ErrorKind::Io,
            LinkError::NoConnection
            | LinkError::AlreadyListening
            | LinkError::AdapterStateMismatch { .. } => ErrorKind::State,
        }
    }

    /// Returns true for errors that leave the session exactly as it was
    /// and need no reporting
    #[must_use]
    pub fn is_benign(&self) -> bool {
        matches!(self, LinkError::AlreadyListening)
    }

    /// Create an invalid request error with static context (zero allocation)
    #[must_use]
    pub const fn invalid_request(context: &'static str) -> Self {
        LinkError::InvalidRequest(Cow::Borrowed(context))
    }

    /// Create a connect error with static context (zero allocation)
    #[must_use]
    pub const fn connect_failed(context: &'static str) -> Self {
        LinkError::ConnectFailed(Cow::Borrowed(context))
    }

    /// Create an invalid config error with static context (zero allocation)
    #[must_use]
    pub const fn invalid_config(context: &'static str) -> Self {
        LinkError::InvalidConfig(Cow::Borrowed(context))
    }
}

impl From<DiscoveryError> for LinkError {
    fn from(err: DiscoveryError) -> Self {
        match err {
            DiscoveryError::NoDevicesFound => LinkError::NoDevicesFound,
            DiscoveryError::DiscoveryFailed(e) => LinkError::DiscoveryFailed(e.to_string().into()),
            DiscoveryError::AdvertisingFailed(e) => {
                LinkError::AdvertisingFailed(e.to_string().into())
            }
        }
    }
}

/// Result type for Session operations
pub type Result<T> = std::result::Result<T, LinkError>;

#[cfg(test)]
mod tests {
    use super::*;
    use proxima_transport::TransportError;

    #[test]
    fn test_validation_errors() {
        assert_eq!(LinkError::invalid_request("x").kind(), ErrorKind::Validation);
        assert_eq!(LinkError::EmptyPayload.kind(), ErrorKind::Validation);
        assert_eq!(LinkError::invalid_config("x").kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_state_errors() {
        assert_eq!(LinkError::NoConnection.kind(), ErrorKind::State);
        assert_eq!(LinkError::AlreadyListening.kind(), ErrorKind::State);
        let mismatch = LinkError::AdapterStateMismatch {
            requested: AdapterState::Enabled,
            actual: AdapterState::Disabled,
        };
        assert_eq!(mismatch.kind(), ErrorKind::State);
        assert_eq!(mismatch.to_string(), "Adapter is disabled, expected enabled");
    }

    #[test]
    fn test_only_already_listening_is_benign() {
        assert!(LinkError::AlreadyListening.is_benign());
        assert!(!LinkError::NoConnection.is_benign());
        assert!(!LinkError::Io(Cow::Borrowed("eof")).is_benign());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            LinkError::PeerNotFound("Alice".to_string()).to_string(),
            "Peer not found: Alice"
        );
        assert_eq!(LinkError::NoDevicesFound.to_string(), "No devices were found");
        assert!(
            LinkError::AcceptFailed(Cow::Borrowed("reset"))
                .to_string()
                .starts_with("Error occurred while processing incoming request")
        );
    }

    #[test]
    fn test_discovery_error_conversion() {
        let err: LinkError = DiscoveryError::NoDevicesFound.into();
        assert!(matches!(err, LinkError::NoDevicesFound));
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err: LinkError = DiscoveryError::DiscoveryFailed(TransportError::adapter_off()).into();
        assert!(matches!(err, LinkError::DiscoveryFailed(_)));
        assert!(err.to_string().contains("0x8007048F"));

        let err: LinkError = DiscoveryError::AdvertisingFailed(TransportError::Closed).into();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }
}
