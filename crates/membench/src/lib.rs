//! # membench
//!
//! Host/device memory bandwidth profiler.
//!
//! Measures five copy paths on one compute device and reports GB/s for each:
//!
//! - host to host between pageable buffers
//! - host to host between pinned buffers
//! - host to device and device to host from pageable buffers
//! - host to device and device to host from pinned buffers
//! - device to device
//!
//! Every phase uses the same protocol (warm-up, timed copies, content check)
//! and is bracketed by a named profiler range.
//!
//! ## Quick Start
//!
//! ```ignore
//! use membench::prelude::*;
//!
//! let config = BenchConfig::default();
//! let report = membench::run_suite(Backend::Auto, &config, RangeMode::Auto)?;
//! print!("{}", report.render_text());
//! ```
//!
//! ## Backends
//!
//! - **CPU** - host-emulated device, always available
//! - **CUDA** - NVIDIA GPUs (requires `cuda` feature)
//!
//! ```toml
//! [dependencies]
//! membench = { version = "0.1", features = ["cuda"] }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(hidden_glob_reexports)]

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

pub use membench_core::*;

pub use membench_cpu::{CpuEngine, EngineStats, EngineStatsSnapshot, FaultInjection, LockedHostBuffer};
pub use membench_cuda::{cuda_device_count, is_cuda_available, CudaEngine, NvtxProfiler};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{run_suite, RangeMode};
    pub use membench_core::prelude::*;
    pub use membench_cpu::{CpuEngine, FaultInjection};
    pub use membench_cuda::CudaEngine;
}

/// Which profiler ranges bracket the phases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeMode {
    /// NVTX on CUDA, tracing spans otherwise.
    #[default]
    Auto,
    /// NVTX ranges.
    Nvtx,
    /// `tracing` spans.
    Tracing,
    /// No ranges.
    None,
}

impl RangeMode {
    /// Parse a range mode.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "nvtx" => Ok(Self::Nvtx),
            "tracing" => Ok(Self::Tracing),
            "none" | "off" => Ok(Self::None),
            _ => Err(BenchError::InvalidConfig(format!(
                "Unknown range mode '{}'. Valid options: auto, nvtx, tracing, none",
                s
            ))),
        }
    }

    /// Build the profiler for this mode on a resolved backend.
    pub fn profiler(self, backend: Backend) -> Box<dyn PhaseProfiler> {
        match self {
            RangeMode::Auto if backend == Backend::Cuda => Box::new(NvtxProfiler::new()),
            RangeMode::Auto | RangeMode::Tracing => Box::new(TracingProfiler),
            RangeMode::Nvtx => Box::new(NvtxProfiler::new()),
            RangeMode::None => Box::new(NullProfiler),
        }
    }
}

/// Backends usable in this build on this machine.
pub fn available_backends() -> Vec<Backend> {
    let mut backends = Vec::new();
    if is_cuda_available() {
        backends.push(Backend::Cuda);
    }
    backends.push(Backend::Cpu);
    backends
}

/// Turn a requested backend into a concrete one.
///
/// `Auto` picks CUDA when a device is present, else the host-emulated
/// engine. Asking for CUDA explicitly fails if it is not compiled in or no
/// device is present.
pub fn resolve_backend(requested: Backend) -> Result<Backend> {
    match requested {
        Backend::Auto => {
            if is_cuda_available() {
                info!("Auto-selected CUDA backend");
                Ok(Backend::Cuda)
            } else {
                info!("Auto-selected CPU backend (no GPU available)");
                Ok(Backend::Cpu)
            }
        }
        Backend::Cuda => {
            if !cfg!(feature = "cuda") {
                return Err(BenchError::BackendUnavailable(
                    "CUDA feature not enabled".to_string(),
                ));
            }
            if !is_cuda_available() {
                return Err(BenchError::BackendUnavailable(
                    "no CUDA device found".to_string(),
                ));
            }
            Ok(Backend::Cuda)
        }
        Backend::Cpu => Ok(Backend::Cpu),
    }
}

/// Resolve the backend, open its engine on `config.device_index` and run the
/// full suite.
///
/// Allocations and frees show up as markers on the same profiler that
/// brackets the phases.
pub fn run_suite(backend: Backend, config: &BenchConfig, ranges: RangeMode) -> Result<SuiteReport> {
    config.validate()?;
    let backend = resolve_backend(backend)?;
    let profiler: Arc<dyn PhaseProfiler> = ranges.profiler(backend).into();
    let tracker = Arc::new(AllocationTracker::with_profiler(Arc::clone(&profiler)));
    info!(backend = backend.label(), ranges = profiler.name(), "opening engine");

    match backend {
        Backend::Cuda => {
            let engine = CudaEngine::with_tracker(config.device_index, tracker)?;
            run_bandwidth_suite(engine, config, profiler.as_ref())
        }
        Backend::Cpu | Backend::Auto => {
            let engine = CpuEngine::with_tracker(config.device_index, tracker)?;
            run_bandwidth_suite(engine, config, profiler.as_ref())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_mode_parse() {
        assert_eq!(RangeMode::parse("auto").unwrap(), RangeMode::Auto);
        assert_eq!(RangeMode::parse("NVTX").unwrap(), RangeMode::Nvtx);
        assert_eq!(RangeMode::parse("off").unwrap(), RangeMode::None);
        assert!(RangeMode::parse("chrome").is_err());
    }

    #[test]
    fn test_range_mode_profiler() {
        assert_eq!(RangeMode::Auto.profiler(Backend::Cpu).name(), "tracing");
        assert_eq!(RangeMode::None.profiler(Backend::Cpu).name(), "null");
        assert_eq!(RangeMode::Tracing.profiler(Backend::Cuda).name(), "tracing");
    }

    #[test]
    fn test_cpu_always_available() {
        assert!(available_backends().contains(&Backend::Cpu));
        assert_eq!(resolve_backend(Backend::Cpu).unwrap(), Backend::Cpu);
    }

    #[test]
    fn test_auto_resolves_to_concrete_backend() {
        let backend = resolve_backend(Backend::Auto).unwrap();
        assert_ne!(backend, Backend::Auto);
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_cuda_unavailable_without_feature() {
        assert!(matches!(
            resolve_backend(Backend::Cuda),
            Err(BenchError::BackendUnavailable(_))
        ));
    }
}
