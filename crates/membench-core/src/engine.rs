//! Copy engine abstraction.
//!
//! A [`CopyEngine`] owns one device context and provides device buffers,
//! pinned host buffers, blocking copies and event timers. The profiler is
//! generic over it, so the CUDA backend and the host-emulated backend run
//! through identical measurement code.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::buffer::{Element, HostBuffer};
use crate::error::{BenchError, Result};
use crate::tracker::AllocationTracker;

/// Backend kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Pick CUDA when available, else the host-emulated engine.
    Auto,
    /// NVIDIA CUDA.
    Cuda,
    /// Host-emulated device.
    Cpu,
}

impl Backend {
    /// Parse a backend name.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cuda" | "gpu" => Ok(Self::Cuda),
            "cpu" | "host" => Ok(Self::Cpu),
            _ => Err(BenchError::InvalidConfig(format!(
                "Unknown backend '{}'. Valid options: auto, cuda, cpu",
                s
            ))),
        }
    }

    /// Label.
    pub fn label(&self) -> &'static str {
        match self {
            Backend::Auto => "auto",
            Backend::Cuda => "cuda",
            Backend::Cpu => "cpu",
        }
    }
}

/// A device-resident buffer.
pub trait DeviceBuffer {
    /// Number of elements.
    fn len(&self) -> usize;

    /// Whether the buffer holds no elements.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A start/stop timestamp pair.
///
/// `elapsed` blocks until the stop marker has completed, so no timed region
/// overlaps the read of its own timing.
pub trait EventTimer {
    /// Record the start marker.
    fn start(&mut self) -> Result<()>;

    /// Record the stop marker.
    fn stop(&mut self) -> Result<()>;

    /// Wait for the stop marker and return the time between the markers.
    fn elapsed(&mut self) -> Result<Duration>;
}

/// Device context with copy and timing primitives.
///
/// All copies block until the data is in place.
pub trait CopyEngine {
    /// Device memory handle.
    type DeviceBuffer: DeviceBuffer;
    /// Pinned host memory handle.
    type PinnedBuffer: HostBuffer;
    /// Event timer.
    type Timer: EventTimer;

    /// Backend kind.
    fn backend(&self) -> Backend;

    /// Device ordinal.
    fn ordinal(&self) -> usize;

    /// Device identification string.
    fn device_name(&self) -> &str;

    /// Tracker that records this engine's allocations.
    fn tracker(&self) -> &Arc<AllocationTracker>;

    /// Allocate uninitialized device memory for `len` elements.
    fn alloc_device(&self, len: usize, label: &str) -> Result<Self::DeviceBuffer>;

    /// Allocate zeroed pinned host memory for `len` elements.
    fn alloc_pinned(&self, len: usize, label: &str) -> Result<Self::PinnedBuffer>;

    /// Copy host memory into a device buffer.
    fn copy_host_to_device(&self, src: &[Element], dst: &mut Self::DeviceBuffer) -> Result<()>;

    /// Copy a device buffer into host memory.
    fn copy_device_to_host(&self, src: &Self::DeviceBuffer, dst: &mut [Element]) -> Result<()>;

    /// Copy between two device buffers.
    fn copy_device_to_device(
        &self,
        src: &Self::DeviceBuffer,
        dst: &mut Self::DeviceBuffer,
    ) -> Result<()>;

    /// Set every element of a device buffer.
    fn fill_device(&self, dst: &mut Self::DeviceBuffer, value: Element) -> Result<()>;

    /// Create a start/stop timer on this engine's stream.
    fn create_timer(&self) -> Result<Self::Timer>;

    /// Wait for all outstanding device work.
    fn synchronize(&self) -> Result<()>;

    /// Tear down the device context. Buffers must already be dropped.
    fn reset(self) -> Result<()>
    where
        Self: Sized;
}

/// Check that a copy's source and destination lengths agree.
pub fn check_lengths(src: usize, dst: usize) -> Result<()> {
    if src != dst {
        return Err(BenchError::SizeMismatch { src, dst });
    }
    Ok(())
}
