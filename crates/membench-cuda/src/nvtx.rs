//! NVTX ranges for Nsight Systems timelines.

use std::sync::atomic::{AtomicBool, Ordering};

use cudarc::nvtx;

use membench_core::ranges::{PhaseProfiler, ProfilerColor, ProfilerRange};

/// NVTX category used for every transfer range.
pub const TRANSFER_CATEGORY: u32 = 2;

/// Pushes one NVTX range per benchmark phase.
pub struct NvtxProfiler {
    enabled: AtomicBool,
}

impl NvtxProfiler {
    /// Create a profiler and name the transfer category.
    pub fn new() -> Self {
        nvtx::name_category(TRANSFER_CATEGORY, "Transfer");
        Self {
            enabled: AtomicBool::new(true),
        }
    }

    /// Enable or disable range emission.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Whether ranges are emitted.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }
}

impl Default for NvtxProfiler {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseProfiler for NvtxProfiler {
    fn name(&self) -> &'static str {
        "nvtx"
    }

    fn range(&self, name: &str, color: ProfilerColor) -> ProfilerRange {
        if !self.is_enabled() {
            return ProfilerRange::stub(name);
        }

        let mut event = nvtx::Event::message(name);
        event.argb(color.to_argb());
        event.category(TRANSFER_CATEGORY);
        ProfilerRange::with_handle(name, Box::new(event.range()))
    }

    fn mark(&self, text: &str) {
        if self.is_enabled() {
            nvtx::mark(text);
        }
    }
}
