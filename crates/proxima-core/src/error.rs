//! Error types for the Proxima framing layer.

use std::io;
use std::string::FromUtf8Error;
use thiserror::Error;

/// Frame-level errors
#[derive(Debug, Error)]
pub enum FrameError {
    /// Length prefix decoded to a negative value
    #[error("negative frame length: {0}")]
    NegativeLength(i32),

    /// Message exceeds the configured maximum
    #[error("message too large: {size} bytes exceeds maximum of {max}")]
    MessageTooLarge {
        /// Size of the message in bytes
        size: usize,
        /// Maximum allowed size
        max: usize,
    },

    /// Payload is not valid UTF-8
    #[error("invalid UTF-8 payload: {0}")]
    InvalidUtf8(#[from] FromUtf8Error),

    /// Underlying stream failed or ended mid-frame
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The stream half has already been released
    #[error("stream closed")]
    Closed,
}

impl FrameError {
    /// Whether the error came from the stream rather than the frame content
    #[must_use]
    pub fn is_io(&self) -> bool {
        matches!(self, FrameError::Io(_) | FrameError::Closed)
    }

    /// Whether the peer closed the stream cleanly between frames
    #[must_use]
    pub fn is_eof(&self) -> bool {
        matches!(self, FrameError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof)
    }
}
