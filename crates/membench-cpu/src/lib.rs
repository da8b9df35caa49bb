//! Host-emulated backend for membench.
//!
//! Implements [`CopyEngine`](membench_core::CopyEngine) entirely in host
//! memory so the measurement protocol can run, and be tested, on machines
//! without a GPU. Device buffers are separate heap allocations, pinned
//! buffers are page-locked mappings and timers are `Instant` pairs.
//!
//! The engine also counts every operation ([`EngineStats`]) and can inject
//! faults ([`FaultInjection`]).

#![warn(missing_docs)]
#![warn(clippy::all)]

mod engine;
mod pinned;

pub use engine::{CpuDeviceBuffer, CpuEngine, CpuTimer, EngineStats, EngineStatsSnapshot, FaultInjection};
pub use pinned::LockedHostBuffer;
