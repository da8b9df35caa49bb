//! Error types for the bandwidth profiler.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for membench operations.
pub type Result<T> = std::result::Result<T, BenchError>;

/// Broad category of a failure, used by the error policy and in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Host or device allocation failed.
    Allocation,
    /// The copy engine rejected or failed a transfer.
    Copy,
    /// Timing markers could not be created, recorded or read.
    Timing,
    /// A copy completed but the destination differs from the source.
    Mismatch,
    /// Backend or configuration problems outside the measurement itself.
    Setup,
}

impl FailureKind {
    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            FailureKind::Allocation => "allocation",
            FailureKind::Copy => "copy",
            FailureKind::Timing => "timing",
            FailureKind::Mismatch => "mismatch",
            FailureKind::Setup => "setup",
        }
    }
}

/// Errors raised by engines and the profiler.
#[derive(Error, Debug)]
pub enum BenchError {
    /// Pageable or pinned host allocation failed.
    #[error("Host allocation failed: {size} bytes ({reason})")]
    HostAllocationFailed {
        /// Requested size in bytes.
        size: usize,
        /// Reason reported by the allocator.
        reason: String,
    },

    /// Device allocation failed.
    #[error("Device allocation failed: {size} bytes ({reason})")]
    DeviceAllocationFailed {
        /// Requested size in bytes.
        size: usize,
        /// Reason reported by the driver.
        reason: String,
    },

    /// A copy failed.
    #[error("{direction} copy failed: {reason}")]
    TransferFailed {
        /// Short direction label (H2D, D2H, D2D).
        direction: &'static str,
        /// Reason reported by the driver.
        reason: String,
    },

    /// Source and destination of a copy have different lengths.
    #[error("Size mismatch: source has {src} elements, destination has {dst}")]
    SizeMismatch {
        /// Source length in elements.
        src: usize,
        /// Destination length in elements.
        dst: usize,
    },

    /// Timer creation, recording or readback failed.
    #[error("Timer error: {0}")]
    TimerError(String),

    /// Timer used out of order.
    #[error("Invalid timer state: expected {expected}, got {actual}")]
    InvalidTimerState {
        /// Expected state.
        expected: &'static str,
        /// Actual state.
        actual: &'static str,
    },

    /// Requested backend is not compiled in or has no device.
    #[error("Backend not available: {0}")]
    BackendUnavailable(String),

    /// Generic backend error (context creation, device query, synchronize).
    #[error("Backend error: {0}")]
    BackendError(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BenchError {
    /// Classify this error for the error policy.
    pub fn kind(&self) -> FailureKind {
        match self {
            BenchError::HostAllocationFailed { .. } | BenchError::DeviceAllocationFailed { .. } => {
                FailureKind::Allocation
            }
            BenchError::TransferFailed { .. } | BenchError::SizeMismatch { .. } => {
                FailureKind::Copy
            }
            BenchError::TimerError(_) | BenchError::InvalidTimerState { .. } => FailureKind::Timing,
            BenchError::BackendUnavailable(_)
            | BenchError::BackendError(_)
            | BenchError::InvalidConfig(_)
            | BenchError::Io(_) => FailureKind::Setup,
        }
    }

    /// Whether the error policy may choose to continue past this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self.kind(), FailureKind::Copy | FailureKind::Timing)
    }
}

impl From<toml::de::Error> for BenchError {
    fn from(e: toml::de::Error) -> Self {
        BenchError::InvalidConfig(e.to_string())
    }
}

impl From<toml::ser::Error> for BenchError {
    fn from(e: toml::ser::Error) -> Self {
        BenchError::InvalidConfig(e.to_string())
    }
}
