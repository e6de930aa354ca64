//! Bridge commands and their JSON options
//!
//! Callers name an action and pass its arguments as JSON. Arguments arrive
//! either as an array whose first element is the options (as an object or as
//! a JSON-encoded string), or as the options object itself.

use crate::error::{BridgeError, Result};
use proxima_core::{ConnectionMode, ConnectionRequest};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Options of the `connect` action
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectOptions {
    /// Display name of the target peer
    #[serde(default)]
    pub address: Option<String>,
    /// Connection mode: 0 phone-to-phone, 1 phone-to-device
    #[serde(rename = "type", default)]
    pub kind: u8,
    /// Optional first message
    #[serde(default)]
    pub message: Option<String>,
    /// Re-enter advertising when this connection is closed
    #[serde(default)]
    pub continue_advertise: bool,
}

impl ConnectOptions {
    /// Build the session request.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOption` for a missing address or an unknown type
    pub fn into_request(self) -> Result<ConnectionRequest> {
        let address = self
            .address
            .filter(|a| !a.is_empty())
            .ok_or_else(|| BridgeError::InvalidOption("address is required".to_string()))?;
        let mode = ConnectionMode::try_from(self.kind)
            .map_err(|kind| BridgeError::InvalidOption(format!("unknown connection type {kind}")))?;

        let mut request = ConnectionRequest::new(address)
            .with_mode(mode)
            .keep_advertising(self.continue_advertise);
        if let Some(message) = self.message {
            request = request.with_payload(message);
        }
        Ok(request)
    }
}

/// Options of the `disconnect` action
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectOptions {
    /// Re-enter advertising afterwards; when absent the connection's own
    /// setting applies
    #[serde(default)]
    pub continue_advertise: Option<bool>,
}

/// Options of the `send` action
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SendOptions {
    /// Text to send
    #[serde(default)]
    pub message: String,
}

/// A parsed bridge command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Probe the adapter
    IsEnabled,
    /// Ask for the adapter to be switched on
    Enable,
    /// Ask for the adapter to be switched off
    Disable,
    /// Run discovery
    DiscoverDevices,
    /// Become discoverable and accept inbound requests
    StartAdvertising,
    /// Open the connection
    Connect(ConnectionRequest),
    /// Close the connection
    Disconnect(DisconnectOptions),
    /// Send one message
    Send(SendOptions),
    /// Stream incoming messages
    Read,
}

impl Command {
    /// Parse an action name and its JSON arguments.
    ///
    /// # Errors
    ///
    /// - `UnknownAction` for an unrecognised action
    /// - `Json` or `InvalidOption` for malformed options
    pub fn parse(action: &str, args_json: &str) -> Result<Self> {
        let command = match action {
            "isEnabled" => Command::IsEnabled,
            "enable" => Command::Enable,
            "disable" => Command::Disable,
            "discoverDevices" => Command::DiscoverDevices,
            "startAdvertising" => Command::StartAdvertising,
            "connect" => {
                Command::Connect(parse_options::<ConnectOptions>(args_json)?.into_request()?)
            }
            "disconnect" => Command::Disconnect(parse_options(args_json)?),
            "send" => Command::Send(parse_options(args_json)?),
            "read" => Command::Read,
            other => return Err(BridgeError::UnknownAction(other.to_string())),
        };
        Ok(command)
    }

    /// Action name as callers spell it
    #[must_use]
    pub fn action(&self) -> &'static str {
        match self {
            Command::IsEnabled => "isEnabled",
            Command::Enable => "enable",
            Command::Disable => "disable",
            Command::DiscoverDevices => "discoverDevices",
            Command::StartAdvertising => "startAdvertising",
            Command::Connect(_) => "connect",
            Command::Disconnect(_) => "disconnect",
            Command::Send(_) => "send",
            Command::Read => "read",
        }
    }
}

/// Decode the options carried by an argument payload
fn parse_options<T: DeserializeOwned + Default>(args_json: &str) -> Result<T> {
    if args_json.trim().is_empty() {
        return Ok(T::default());
    }

    let args: Value = serde_json::from_str(args_json)?;
    let options = match args {
        Value::Array(mut items) => {
            if items.is_empty() {
                Value::Null
            } else {
                items.swap_remove(0)
            }
        }
        other => other,
    };

    match options {
        Value::Null => Ok(T::default()),
        Value::String(encoded) => Ok(serde_json::from_str(&encoded)?),
        Value::Object(_) => Ok(serde_json::from_value(options)?),
        other => Err(BridgeError::InvalidOption(format!(
            "expected options object, got {other}"
        ))),
    }
}
