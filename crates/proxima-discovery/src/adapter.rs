//! Radio adapter power state.

use proxima_transport::{ADAPTER_OFF_FAULT, TransportResult};
use std::fmt;

/// Adapter power state as seen by a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AdapterState {
    /// Adapter is powered off
    Disabled = 0,
    /// Adapter is powered on, or its state could not be determined
    Enabled = 1,
}

impl AdapterState {
    /// Classify the outcome of a probing radio call.
    ///
    /// Only the adapter-off fault means `Disabled`; any other fault is
    /// treated as `Enabled`.
    #[must_use]
    pub fn from_probe<T>(probe: &TransportResult<T>) -> Self {
        match probe {
            Err(e) if e.fault_code() == Some(ADAPTER_OFF_FAULT) => AdapterState::Disabled,
            _ => AdapterState::Enabled,
        }
    }

    /// Whether the adapter is on
    #[must_use]
    pub fn is_enabled(self) -> bool {
        self == AdapterState::Enabled
    }
}

impl From<bool> for AdapterState {
    fn from(enabled: bool) -> Self {
        if enabled {
            AdapterState::Enabled
        } else {
            AdapterState::Disabled
        }
    }
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterState::Disabled => write!(f, "disabled"),
            AdapterState::Enabled => write!(f, "enabled"),
        }
    }
}
