//! CUDA event wrappers for device-side timing.

use std::time::Duration;

use cudarc::driver::result as cuda_result;
use cudarc::driver::sys as cuda_sys;

use membench_core::engine::EventTimer;
use membench_core::error::{BenchError, Result};

/// A CUDA event created with `CU_EVENT_DEFAULT` (timing enabled).
pub struct CudaEvent {
    event: cuda_sys::CUevent,
}

impl CudaEvent {
    /// Create an event in the current context.
    pub fn new() -> Result<Self> {
        let event = cuda_result::event::create(cuda_sys::CUevent_flags::CU_EVENT_DEFAULT)
            .map_err(|e| BenchError::TimerError(format!("Failed to create CUDA event: {:?}", e)))?;
        Ok(Self { event })
    }

    /// Record this event on a stream.
    ///
    /// # Safety
    ///
    /// The stream must be valid and belong to the current CUDA context.
    pub unsafe fn record(&self, stream: cuda_sys::CUstream) -> Result<()> {
        cuda_result::event::record(self.event, stream)
            .map_err(|e| BenchError::TimerError(format!("Failed to record CUDA event: {:?}", e)))
    }

    /// Block until the work captured by this event has completed.
    ///
    /// # Safety
    ///
    /// The event must have been recorded.
    pub unsafe fn synchronize(&self) -> Result<()> {
        cuda_result::event::synchronize(self.event).map_err(|e| {
            BenchError::TimerError(format!("Failed to synchronize CUDA event: {:?}", e))
        })
    }
}

impl Drop for CudaEvent {
    fn drop(&mut self) {
        // Safety: we own this event
        unsafe {
            let _ = cuda_result::event::destroy(self.event);
        }
    }
}

/// Start/stop event pair recorded on one stream.
pub struct GpuTimer {
    start: CudaEvent,
    stop: CudaEvent,
    stream: cuda_sys::CUstream,
    started: bool,
    stopped: bool,
}

impl GpuTimer {
    /// Create a timer that records on `stream`.
    ///
    /// # Safety
    ///
    /// The stream must outlive the timer and belong to the current context.
    pub unsafe fn new(stream: cuda_sys::CUstream) -> Result<Self> {
        Ok(Self {
            start: CudaEvent::new()?,
            stop: CudaEvent::new()?,
            stream,
            started: false,
            stopped: false,
        })
    }
}

impl EventTimer for GpuTimer {
    fn start(&mut self) -> Result<()> {
        // Safety: stream validity is guaranteed at construction
        unsafe { self.start.record(self.stream)? };
        self.started = true;
        self.stopped = false;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if !self.started {
            return Err(BenchError::InvalidTimerState {
                expected: "started",
                actual: "idle",
            });
        }
        unsafe { self.stop.record(self.stream)? };
        self.stopped = true;
        Ok(())
    }

    fn elapsed(&mut self) -> Result<Duration> {
        if !self.stopped {
            return Err(BenchError::InvalidTimerState {
                expected: "stopped",
                actual: if self.started { "running" } else { "idle" },
            });
        }

        let ms = unsafe {
            self.stop.synchronize()?;
            cuda_result::event::elapsed(self.start.event, self.stop.event)
        }
        .map_err(|e| BenchError::TimerError(format!("Failed to get elapsed time: {:?}", e)))?;

        Ok(Duration::from_secs_f64(f64::from(ms.max(0.0)) / 1000.0))
    }
}
