//! # membench Core
//!
//! Measurement protocol and shared types for the membench host/device memory
//! bandwidth profiler.
//!
//! This crate is backend-agnostic. Backends implement [`CopyEngine`] and the
//! generic [`BandwidthProfiler`] drives them with one protocol:
//!
//! - [`profile_host_to_host`](BandwidthProfiler::profile_host_to_host) - pageable or pinned memcpy
//! - [`profile_host_device`](BandwidthProfiler::profile_host_device) - upload and download legs
//! - [`profile_device_to_device`](BandwidthProfiler::profile_device_to_device) - device-internal copies
//! - [`run_bandwidth_suite`] - all five phases, in order, with cleanup
//!
//! ## Example
//!
//! ```ignore
//! use membench_core::prelude::*;
//!
//! let config = BenchConfig::builder().transfer_mib(16).build()?;
//! let report = run_bandwidth_suite(engine, &config, &TracingProfiler)?;
//! print!("{}", report.render_text());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod config;
pub mod engine;
pub mod error;
pub mod policy;
pub mod profiler;
pub mod ranges;
pub mod report;
pub mod suite;
pub mod timing;
pub mod tracker;
pub mod verify;

pub use buffer::{Element, HostAllocation, HostBuffer, PageableBuffer, ELEMENT_SIZE};
pub use config::{BenchConfig, BenchConfigBuilder, DEFAULT_TRANSFER_MB, MIB};
pub use engine::{Backend, CopyEngine, DeviceBuffer, EventTimer};
pub use error::{BenchError, FailureKind, Result};
pub use policy::{ErrorPolicy, FailureLog, PolicyGuard};
pub use profiler::BandwidthProfiler;
pub use ranges::{NullProfiler, PhaseProfiler, ProfilerColor, ProfilerRange, TracingProfiler};
pub use report::{BandwidthFigure, Direction, Phase, RecordedFailure, ReportBlock, SuiteReport};
pub use suite::run_bandwidth_suite;
pub use timing::{round_trip_bandwidth, Bandwidth, Stopwatch, TimingSample, BYTES_PER_GB};
pub use tracker::{AllocationToken, AllocationTracker, MemoryKind, TrackerStats};
pub use verify::{verify_copy, Verification};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::buffer::{fill_ramp, fill_zero, Element, HostAllocation, HostBuffer, PageableBuffer};
    pub use crate::config::{BenchConfig, BenchConfigBuilder};
    pub use crate::engine::{Backend, CopyEngine, DeviceBuffer, EventTimer};
    pub use crate::error::{BenchError, FailureKind, Result};
    pub use crate::policy::ErrorPolicy;
    pub use crate::profiler::BandwidthProfiler;
    pub use crate::ranges::{NullProfiler, PhaseProfiler, ProfilerColor, TracingProfiler};
    pub use crate::report::{Direction, Phase, ReportBlock, SuiteReport};
    pub use crate::suite::run_bandwidth_suite;
    pub use crate::timing::{Bandwidth, Stopwatch};
    pub use crate::tracker::{AllocationTracker, MemoryKind};
    pub use crate::verify::{verify_copy, Verification};
}
