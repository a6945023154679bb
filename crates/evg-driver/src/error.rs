//! Error types for EVG driver operations.

use thiserror::Error;

/// Result type alias for EVG driver operations.
pub type Result<T> = std::result::Result<T, EvgError>;

/// Errors that can occur while configuring or driving an EVG card.
#[derive(Debug, Error)]
pub enum EvgError {
    /// Input outside the documented domain (name length, prescaler range,
    /// sequencer or counter index, timestamp overflow).
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// What was out of domain
        reason: String,
    },

    /// No configured device carries the requested name.
    #[error("unknown device {name:?}")]
    UnknownDevice {
        /// Name that was looked up
        name: String,
    },

    /// The device table already holds the maximum number of devices.
    #[error("device table full ({max} devices)")]
    ConfigFull {
        /// Configured device limit
        max: usize,
    },

    /// Every transmission attempt failed or went unanswered.
    #[error("no reply from device after {attempts} attempts")]
    TransportTimeout {
        /// Number of attempts made before giving up
        attempts: u32,
    },

    /// A verified write read back a different value than was written.
    #[error("read-back mismatch on register {reg:#04x}: wrote {wrote:#06x}, read {read:#06x}")]
    VerifyMismatch {
        /// Register offset
        reg: u16,
        /// Value written
        wrote: u16,
        /// Value read back
        read: u16,
    },

    /// Socket creation or connect failed during init.
    #[error("socket error: {source}")]
    Socket {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },

    /// Operation invoked on a device that is not initialized.
    #[error("device {name:?} is not initialized")]
    NotReady {
        /// Device the operation targeted
        name: String,
    },
}

impl EvgError {
    /// Create an invalid argument error.
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Create an unknown device error.
    pub fn unknown_device(name: impl Into<String>) -> Self {
        Self::UnknownDevice { name: name.into() }
    }

    /// Create a not-ready error.
    pub fn not_ready(name: impl Into<String>) -> Self {
        Self::NotReady { name: name.into() }
    }
}
