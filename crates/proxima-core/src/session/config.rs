//! Session configuration

use super::error::LinkError;
use crate::frame::DEFAULT_MAX_MESSAGE_SIZE;
use std::time::Duration;

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Largest message payload accepted on read or write, in bytes
    pub max_message_size: usize,

    /// Time allowed for the radio to open an outbound connection
    pub connect_timeout: Duration,

    /// Messages buffered between the listen loop and its consumer
    pub listen_channel_capacity: usize,

    /// Session events buffered per subscriber
    pub event_channel_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            connect_timeout: Duration::from_secs(30),
            listen_channel_capacity: 64,
            event_channel_capacity: 16,
        }
    }
}

impl SessionConfig {
    /// Create the default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the message size limit
    #[must_use]
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Set the outbound connect timeout
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the listen channel capacity
    #[must_use]
    pub fn with_listen_channel_capacity(mut self, capacity: usize) -> Self {
        self.listen_channel_capacity = capacity;
        self
    }

    /// Set the event channel capacity
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns `LinkError::InvalidConfig` for a zero limit, timeout or capacity
    /// and for a size limit the length prefix cannot express.
    pub fn validate(&self) -> Result<(), LinkError> {
        if self.max_message_size == 0 {
            return Err(LinkError::invalid_config("max_message_size must be positive"));
        }
        if self.max_message_size > i32::MAX as usize {
            return Err(LinkError::invalid_config(
                "max_message_size exceeds the 32-bit length prefix",
            ));
        }
        if self.connect_timeout.is_zero() {
            return Err(LinkError::invalid_config("connect_timeout must be positive"));
        }
        if self.listen_channel_capacity == 0 {
            return Err(LinkError::invalid_config(
                "listen_channel_capacity must be positive",
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(LinkError::invalid_config(
                "event_channel_capacity must be positive",
            ));
        }
        Ok(())
    }
}
