//! CUDA backend for membench.
//!
//! Implements [`CopyEngine`](membench_core::CopyEngine) on the primary
//! context of one device through cudarc's driver API: `cuMemAlloc` device
//! buffers, `cuMemAllocHost` pinned buffers, synchronous memcpys and
//! `CU_EVENT_DEFAULT` event pairs. [`NvtxProfiler`] brackets each phase with
//! an NVTX range for Nsight Systems.
//!
//! # Requirements
//!
//! - The `cuda` feature
//! - An NVIDIA driver at run time (loaded dynamically)
//!
//! Without the feature [`CudaEngine::new`] returns
//! [`BenchError::BackendUnavailable`](membench_core::BenchError::BackendUnavailable).

#![warn(missing_docs)]

#[cfg(feature = "cuda")]
mod engine;
#[cfg(feature = "cuda")]
mod events;
#[cfg(feature = "cuda")]
mod nvtx;

#[cfg(feature = "cuda")]
pub use engine::{CudaDeviceBuffer, CudaEngine, PinnedHostBuffer};
#[cfg(feature = "cuda")]
pub use events::{CudaEvent, GpuTimer};
#[cfg(feature = "cuda")]
pub use nvtx::{NvtxProfiler, TRANSFER_CATEGORY};

// Placeholder implementations when CUDA is not available
#[cfg(not(feature = "cuda"))]
mod stub {
    use std::sync::Arc;
    use std::time::Duration;

    use membench_core::buffer::{Element, HostAllocation, HostBuffer};
    use membench_core::engine::{Backend, CopyEngine, DeviceBuffer, EventTimer};
    use membench_core::error::{BenchError, Result};
    use membench_core::ranges::{PhaseProfiler, ProfilerColor, ProfilerRange};
    use membench_core::tracker::AllocationTracker;

    /// Stub CUDA engine when the CUDA feature is disabled. Cannot be
    /// constructed.
    pub enum CudaEngine {}

    /// Stub device buffer.
    pub enum CudaDeviceBuffer {}

    /// Stub pinned buffer.
    pub enum PinnedHostBuffer {}

    /// Stub timer.
    pub enum GpuTimer {}

    impl CudaEngine {
        /// Always fails: CUDA support is not compiled in.
        pub fn new(_ordinal: usize) -> Result<Self> {
            Err(BenchError::BackendUnavailable(
                "CUDA feature not enabled".to_string(),
            ))
        }

        /// Always fails: CUDA support is not compiled in.
        pub fn with_tracker(ordinal: usize, _tracker: Arc<AllocationTracker>) -> Result<Self> {
            Self::new(ordinal)
        }

        /// Compute capability as (major, minor).
        pub fn compute_capability(&self) -> (i32, i32) {
            match *self {}
        }
    }

    impl DeviceBuffer for CudaDeviceBuffer {
        fn len(&self) -> usize {
            match *self {}
        }
    }

    impl HostBuffer for PinnedHostBuffer {
        fn allocation(&self) -> HostAllocation {
            match *self {}
        }

        fn as_slice(&self) -> &[Element] {
            match *self {}
        }

        fn as_mut_slice(&mut self) -> &mut [Element] {
            match *self {}
        }
    }

    impl EventTimer for GpuTimer {
        fn start(&mut self) -> Result<()> {
            match *self {}
        }

        fn stop(&mut self) -> Result<()> {
            match *self {}
        }

        fn elapsed(&mut self) -> Result<Duration> {
            match *self {}
        }
    }

    impl CopyEngine for CudaEngine {
        type DeviceBuffer = CudaDeviceBuffer;
        type PinnedBuffer = PinnedHostBuffer;
        type Timer = GpuTimer;

        fn backend(&self) -> Backend {
            Backend::Cuda
        }

        fn ordinal(&self) -> usize {
            match *self {}
        }

        fn device_name(&self) -> &str {
            match *self {}
        }

        fn tracker(&self) -> &Arc<AllocationTracker> {
            match *self {}
        }

        fn alloc_device(&self, _len: usize, _label: &str) -> Result<CudaDeviceBuffer> {
            match *self {}
        }

        fn alloc_pinned(&self, _len: usize, _label: &str) -> Result<PinnedHostBuffer> {
            match *self {}
        }

        fn copy_host_to_device(&self, _src: &[Element], _dst: &mut CudaDeviceBuffer) -> Result<()> {
            match *self {}
        }

        fn copy_device_to_host(&self, _src: &CudaDeviceBuffer, _dst: &mut [Element]) -> Result<()> {
            match *self {}
        }

        fn copy_device_to_device(
            &self,
            _src: &CudaDeviceBuffer,
            _dst: &mut CudaDeviceBuffer,
        ) -> Result<()> {
            match *self {}
        }

        fn fill_device(&self, _dst: &mut CudaDeviceBuffer, _value: Element) -> Result<()> {
            match *self {}
        }

        fn create_timer(&self) -> Result<GpuTimer> {
            match *self {}
        }

        fn synchronize(&self) -> Result<()> {
            match *self {}
        }

        fn reset(self) -> Result<()> {
            match self {}
        }
    }

    /// Stub NVTX profiler: ranges carry no handle.
    #[derive(Debug, Default)]
    pub struct NvtxProfiler;

    impl NvtxProfiler {
        /// Create a stub profiler.
        pub fn new() -> Self {
            Self
        }
    }

    impl PhaseProfiler for NvtxProfiler {
        fn name(&self) -> &'static str {
            "nvtx (disabled)"
        }

        fn range(&self, name: &str, _color: ProfilerColor) -> ProfilerRange {
            ProfilerRange::stub(name)
        }
    }
}

#[cfg(not(feature = "cuda"))]
pub use stub::{CudaDeviceBuffer, CudaEngine, GpuTimer, NvtxProfiler, PinnedHostBuffer};

/// Check if CUDA is available at runtime.
///
/// Returns false if the `cuda` feature is disabled, the driver library is
/// not installed, or no device is present.
pub fn is_cuda_available() -> bool {
    cuda_device_count() > 0
}

/// Get CUDA device count.
///
/// Returns 0 if CUDA is not available or libraries are not installed.
pub fn cuda_device_count() -> usize {
    #[cfg(feature = "cuda")]
    {
        // cudarc panics if CUDA libraries are not found, so we catch that
        engine::device_count()
    }
    #[cfg(not(feature = "cuda"))]
    {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_availability_consistent() {
        let count = cuda_device_count();
        assert_eq!(is_cuda_available(), count > 0);
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_stub_engine_unavailable() {
        use membench_core::BenchError;
        assert!(matches!(
            CudaEngine::new(0),
            Err(BenchError::BackendUnavailable(_))
        ));
    }
}
