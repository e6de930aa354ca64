//! Session state and connection requests

use serde::Serialize;
use std::fmt;

/// Observable state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    /// Nothing in progress
    Idle,
    /// A discovery snapshot is being taken
    Discovering,
    /// Discoverable and accepting inbound requests
    Advertising,
    /// An outbound connection is being opened
    Connecting,
    /// A connection is open
    Connected,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkState::Idle => "idle",
            LinkState::Discovering => "discovering",
            LinkState::Advertising => "advertising",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// How an outbound connection is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[repr(u8)]
pub enum ConnectionMode {
    /// Peer-to-peer pairing with another advertising application
    #[default]
    PhoneToPhone = 0,
    /// Stream connection to a device by host address and service
    PhoneToDevice = 1,
}

impl TryFrom<u8> for ConnectionMode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ConnectionMode::PhoneToPhone),
            1 => Ok(ConnectionMode::PhoneToDevice),
            other => Err(other),
        }
    }
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionMode::PhoneToPhone => write!(f, "phone-to-phone"),
            ConnectionMode::PhoneToDevice => write!(f, "phone-to-device"),
        }
    }
}

/// Outbound connection request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRequest {
    /// Display name of the target peer
    pub target_address: String,
    /// Connect primitive to use
    pub mode: ConnectionMode,
    /// Optional first message sent once connected
    pub payload: Option<String>,
    /// Whether disconnect should re-enter advertising by default
    pub keep_advertising_after_close: bool,
}

impl ConnectionRequest {
    /// Create a phone-to-phone request for `target_address`
    #[must_use]
    pub fn new(target_address: impl Into<String>) -> Self {
        Self {
            target_address: target_address.into(),
            mode: ConnectionMode::PhoneToPhone,
            payload: None,
            keep_advertising_after_close: false,
        }
    }

    /// Set the connection mode
    #[must_use]
    pub fn with_mode(mut self, mode: ConnectionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the first message
    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Re-enter advertising after this connection closes
    #[must_use]
    pub fn keep_advertising(mut self, keep: bool) -> Self {
        self.keep_advertising_after_close = keep;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_from_wire_value() {
        assert_eq!(ConnectionMode::try_from(0), Ok(ConnectionMode::PhoneToPhone));
        assert_eq!(ConnectionMode::try_from(1), Ok(ConnectionMode::PhoneToDevice));
        assert_eq!(ConnectionMode::try_from(2), Err(2));
        assert_eq!(ConnectionMode::PhoneToDevice as u8, 1);
    }

    #[test]
    fn test_request_builder() {
        let req = ConnectionRequest::new("Alice")
            .with_mode(ConnectionMode::PhoneToDevice)
            .with_payload("hello")
            .keep_advertising(true);

        assert_eq!(req.target_address, "Alice");
        assert_eq!(req.mode, ConnectionMode::PhoneToDevice);
        assert_eq!(req.payload.as_deref(), Some("hello"));
        assert!(req.keep_advertising_after_close);
    }

    #[test]
    fn test_state_serializes_lowercase() {
        let json = serde_json::to_string(&LinkState::Connected).unwrap();
        assert_eq!(json, "\"connected\"");
        assert_eq!(LinkState::Advertising.to_string(), "advertising");
    }
}
