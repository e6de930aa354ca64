//! Adapter power round trip
//!
//! The radio cannot be switched programmatically. Asking for a state sends
//! the user to the platform settings screen, then probes again once the app
//! resumes.

use super::error::{LinkError, Result};
use super::session::Session;
use proxima_discovery::AdapterState;

impl Session {
    /// Probe the adapter power state
    pub async fn adapter_state(&self) -> AdapterState {
        self.inner.discovery.detect_adapter_state().await
    }

    /// Whether the adapter is powered on
    pub async fn is_enabled(&self) -> bool {
        self.adapter_state().await.is_enabled()
    }

    /// Bring the adapter into `requested`, via the settings screen if needed.
    ///
    /// # Errors
    ///
    /// - `SettingsUnavailable` if the settings screen cannot be opened
    /// - `AdapterStateMismatch` if the adapter is still in the other state
    ///   once the user comes back
    pub async fn set_adapter_state(&self, requested: AdapterState) -> Result<()> {
        let current = self.adapter_state().await;
        if current == requested {
            return Ok(());
        }

        tracing::info!("Adapter is {}, asking user to switch it {}", current, requested);
        self.inner
            .transport
            .open_settings()
            .await
            .map_err(|e| LinkError::SettingsUnavailable(e.to_string().into()))?;

        let actual = self.adapter_state().await;
        if actual == requested {
            Ok(())
        } else {
            Err(LinkError::AdapterStateMismatch { requested, actual })
        }
    }

    /// Ask for the adapter to be switched on
    ///
    /// # Errors
    ///
    /// See [`Session::set_adapter_state`]
    pub async fn enable(&self) -> Result<()> {
        self.set_adapter_state(AdapterState::Enabled).await
    }

    /// Ask for the adapter to be switched off
    ///
    /// # Errors
    ///
    /// See [`Session::set_adapter_state`]
    pub async fn disable(&self) -> Result<()> {
        self.set_adapter_state(AdapterState::Disabled).await
    }
}
