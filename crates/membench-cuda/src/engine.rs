//! CUDA copy engine on the primary context of one device.

use std::ffi::c_void;
use std::ptr::{self, NonNull};
use std::sync::Arc;

use cudarc::driver::result as cuda_result;
use cudarc::driver::sys as cuda_sys;
use cudarc::driver::{CudaContext, CudaStream};
use tracing::{debug, info};

use membench_core::buffer::{Element, HostAllocation, HostBuffer, ELEMENT_SIZE};
use membench_core::engine::{check_lengths, Backend, CopyEngine, DeviceBuffer};
use membench_core::error::{BenchError, Result};
use membench_core::report::Direction;
use membench_core::tracker::{AllocationToken, AllocationTracker, MemoryKind};

use crate::events::GpuTimer;

/// Device memory from `cuMemAlloc`.
pub struct CudaDeviceBuffer {
    ptr: cuda_sys::CUdeviceptr,
    len: usize,
    ctx: Arc<CudaContext>,
    _token: AllocationToken,
}

impl DeviceBuffer for CudaDeviceBuffer {
    fn len(&self) -> usize {
        self.len
    }
}

impl Drop for CudaDeviceBuffer {
    fn drop(&mut self) {
        let _ = self.ctx.bind_to_thread();
        unsafe {
            let _ = cuda_result::free_sync(self.ptr);
        }
    }
}

/// Page-locked host memory from `cuMemAllocHost`.
pub struct PinnedHostBuffer {
    ptr: NonNull<Element>,
    len: usize,
    ctx: Arc<CudaContext>,
    _token: AllocationToken,
}

// Safety: the buffer owns its allocation exclusively
unsafe impl Send for PinnedHostBuffer {}

impl HostBuffer for PinnedHostBuffer {
    fn allocation(&self) -> HostAllocation {
        HostAllocation::Pinned
    }

    fn as_slice(&self) -> &[Element] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    fn as_mut_slice(&mut self) -> &mut [Element] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for PinnedHostBuffer {
    fn drop(&mut self) {
        let _ = self.ctx.bind_to_thread();
        unsafe {
            let _ = cuda_sys::lib().cuMemFreeHost(self.ptr.as_ptr() as *mut c_void);
        }
    }
}

/// Copy engine backed by the CUDA driver API.
///
/// All copies are synchronous and issued on the legacy default stream, the
/// same stream the timing events are recorded on.
pub struct CudaEngine {
    ctx: Arc<CudaContext>,
    stream: Arc<CudaStream>,
    ordinal: usize,
    name: String,
    compute_capability: (i32, i32),
    tracker: Arc<AllocationTracker>,
}

impl CudaEngine {
    /// Open the primary context of device `ordinal`.
    pub fn new(ordinal: usize) -> Result<Self> {
        Self::with_tracker(ordinal, Arc::new(AllocationTracker::new()))
    }

    /// Open device `ordinal`, recording allocations in `tracker`.
    pub fn with_tracker(ordinal: usize, tracker: Arc<AllocationTracker>) -> Result<Self> {
        let ctx = CudaContext::new(ordinal).map_err(|e| {
            BenchError::BackendError(format!("Failed to create CUDA device {}: {}", ordinal, e))
        })?;

        let name = ctx
            .name()
            .map_err(|e| BenchError::BackendError(format!("Failed to get device name: {}", e)))?;

        let compute_capability = ctx.compute_capability().map_err(|e| {
            BenchError::BackendError(format!("Failed to get compute capability: {}", e))
        })?;

        let stream = ctx.default_stream();

        info!(
            "Initializing CUDA copy engine on device {}: {} (CC {}.{})",
            ordinal, name, compute_capability.0, compute_capability.1
        );

        Ok(Self {
            ctx,
            stream,
            ordinal,
            name,
            compute_capability,
            tracker,
        })
    }

    /// Compute capability as (major, minor).
    pub fn compute_capability(&self) -> (i32, i32) {
        self.compute_capability
    }

    fn bind(&self) -> Result<()> {
        self.ctx
            .bind_to_thread()
            .map_err(|e| BenchError::BackendError(format!("Failed to bind context: {}", e)))
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
        self.ordinal
    }

    fn device_name(&self) -> &str {
        &self.name
    }

    fn tracker(&self) -> &Arc<AllocationTracker> {
        &self.tracker
    }

    fn alloc_device(&self, len: usize, label: &str) -> Result<CudaDeviceBuffer> {
        let size = len * ELEMENT_SIZE;
        if len == 0 {
            return Err(BenchError::DeviceAllocationFailed {
                size,
                reason: "cannot allocate zero-length buffer".to_string(),
            });
        }
        self.bind()?;

        let ptr = unsafe { cuda_result::malloc_sync(size) }.map_err(|e| {
            BenchError::DeviceAllocationFailed {
                size,
                reason: format!("cuMemAlloc failed: {:?}", e),
            }
        })?;

        let token = self.tracker.register(ptr, size, MemoryKind::Device, label);
        debug!(label, size, ptr, "device alloc");

        Ok(CudaDeviceBuffer {
            ptr,
            len,
            ctx: Arc::clone(&self.ctx),
            _token: token,
        })
    }

    fn alloc_pinned(&self, len: usize, label: &str) -> Result<PinnedHostBuffer> {
        let size = len * ELEMENT_SIZE;
        if len == 0 {
            return Err(BenchError::HostAllocationFailed {
                size,
                reason: "cannot allocate zero-length buffer".to_string(),
            });
        }
        self.bind()?;

        let mut host_ptr: *mut c_void = ptr::null_mut();
        unsafe {
            let result = cuda_sys::lib().cuMemAllocHost_v2(&mut host_ptr, size);
            if result != cuda_sys::CUresult::CUDA_SUCCESS {
                return Err(BenchError::HostAllocationFailed {
                    size,
                    reason: format!("cuMemAllocHost failed: {:?}", result),
                });
            }
            ptr::write_bytes(host_ptr as *mut u8, 0, size);
        }

        let ptr = NonNull::new(host_ptr as *mut Element).ok_or_else(|| {
            BenchError::HostAllocationFailed {
                size,
                reason: "cuMemAllocHost returned null".to_string(),
            }
        })?;

        let token = self
            .tracker
            .register(host_ptr as u64, size, MemoryKind::Pinned, label);

        Ok(PinnedHostBuffer {
            ptr,
            len,
            ctx: Arc::clone(&self.ctx),
            _token: token,
        })
    }

    fn copy_host_to_device(&self, src: &[Element], dst: &mut CudaDeviceBuffer) -> Result<()> {
        check_lengths(src.len(), dst.len)?;
        unsafe { cuda_result::memcpy_htod_sync(dst.ptr, src) }.map_err(|e| {
            BenchError::TransferFailed {
                direction: Direction::HostToDevice.short_label(),
                reason: format!("{:?}", e),
            }
        })
    }

    fn copy_device_to_host(&self, src: &CudaDeviceBuffer, dst: &mut [Element]) -> Result<()> {
        check_lengths(src.len, dst.len())?;
        unsafe { cuda_result::memcpy_dtoh_sync(dst, src.ptr) }.map_err(|e| {
            BenchError::TransferFailed {
                direction: Direction::DeviceToHost.short_label(),
                reason: format!("{:?}", e),
            }
        })
    }

    fn copy_device_to_device(
        &self,
        src: &CudaDeviceBuffer,
        dst: &mut CudaDeviceBuffer,
    ) -> Result<()> {
        check_lengths(src.len, dst.len)?;
        unsafe { cuda_result::memcpy_dtod_sync(dst.ptr, src.ptr, src.len * ELEMENT_SIZE) }
            .map_err(|e| BenchError::TransferFailed {
                direction: Direction::DeviceToDevice.short_label(),
                reason: format!("{:?}", e),
            })
    }

    fn fill_device(&self, dst: &mut CudaDeviceBuffer, value: Element) -> Result<()> {
        unsafe { cuda_result::memset_d32_sync(dst.ptr, value.to_bits(), dst.len) }
            .map_err(|e| BenchError::BackendError(format!("cuMemsetD32 failed: {:?}", e)))
    }

    fn create_timer(&self) -> Result<GpuTimer> {
        self.bind()?;
        // Safety: the stream belongs to our context, which outlives every timer
        unsafe { GpuTimer::new(self.stream.cu_stream()) }
    }

    fn synchronize(&self) -> Result<()> {
        self.ctx
            .synchronize()
            .map_err(|e| BenchError::BackendError(format!("Synchronize failed: {}", e)))
    }

    fn reset(self) -> Result<()> {
        self.synchronize()?;
        let remaining = Arc::strong_count(&self.ctx);
        if remaining > 1 {
            debug!(remaining, "context still referenced at reset");
        }
        info!(ordinal = self.ordinal, "CUDA context released");
        drop(self.stream);
        drop(self.ctx);
        Ok(())
    }
}

/// Number of CUDA devices, 0 when the driver cannot be loaded.
pub fn device_count() -> usize {
    std::panic::catch_unwind(|| CudaContext::device_count().unwrap_or(0) as usize).unwrap_or(0)
}
