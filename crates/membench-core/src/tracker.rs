//! Allocation tracking with leak detection.
//!
//! Every buffer the suite allocates holds an [`AllocationToken`] that
//! deregisters itself on drop, so `outstanding()` returning to zero after a
//! run proves that nothing leaked.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use membench_core::tracker::{AllocationTracker, MemoryKind};
//!
//! let tracker = Arc::new(AllocationTracker::new());
//! {
//!     let _token = tracker.register(0x1000, 4096, MemoryKind::Device, "d_a");
//!     assert_eq!(tracker.outstanding(), 1);
//! }
//! assert_eq!(tracker.outstanding(), 0);
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use crate::ranges::PhaseProfiler;

/// Kind of memory an allocation lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    /// Ordinary swappable host memory.
    Pageable,
    /// Page-locked host memory.
    Pinned,
    /// Device-resident memory.
    Device,
}

impl MemoryKind {
    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            MemoryKind::Pageable => "Pageable",
            MemoryKind::Pinned => "Pinned",
            MemoryKind::Device => "Device",
        }
    }

    /// Whether this memory lives on the host.
    pub fn is_host(&self) -> bool {
        !matches!(self, MemoryKind::Device)
    }
}

/// A live allocation.
#[derive(Debug, Clone)]
pub struct TrackedAllocation {
    /// Unique allocation ID.
    pub id: u64,
    /// Address (host pointer or device pointer).
    pub ptr: u64,
    /// Size in bytes.
    pub size: usize,
    /// Memory kind.
    pub kind: MemoryKind,
    /// Buffer label.
    pub label: String,
    /// When the allocation was registered.
    pub allocated_at: Instant,
}

impl TrackedAllocation {
    /// Age of this allocation in seconds.
    pub fn age_secs(&self) -> f64 {
        self.allocated_at.elapsed().as_secs_f64()
    }
}

/// Per-kind statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KindStats {
    /// Live allocations.
    pub count: usize,
    /// Live bytes.
    pub bytes: u64,
}

/// Snapshot of tracker state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrackerStats {
    /// Live bytes across all kinds.
    pub current_bytes: u64,
    /// Highest live byte count seen.
    pub peak_bytes: u64,
    /// Allocations registered over the tracker's lifetime.
    pub total_allocations: u64,
    /// Allocations released over the tracker's lifetime.
    pub total_deallocations: u64,
    /// Live allocations per kind.
    pub by_kind: HashMap<MemoryKind, KindStats>,
}

/// Records host and device allocations made during a run.
pub struct AllocationTracker {
    allocations: RwLock<HashMap<u64, TrackedAllocation>>,
    profiler: Option<Arc<dyn PhaseProfiler>>,
    current_bytes: AtomicU64,
    peak_bytes: AtomicU64,
    next_id: AtomicU64,
    total_allocations: AtomicU64,
    total_deallocations: AtomicU64,
    enabled: AtomicBool,
}

impl AllocationTracker {
    /// Create a tracker.
    pub fn new() -> Self {
        Self {
            allocations: RwLock::new(HashMap::new()),
            profiler: None,
            current_bytes: AtomicU64::new(0),
            peak_bytes: AtomicU64::new(0),
            next_id: AtomicU64::new(1),
            total_allocations: AtomicU64::new(0),
            total_deallocations: AtomicU64::new(0),
            enabled: AtomicBool::new(true),
        }
    }

    /// Create a tracker that also emits profiler markers on alloc and free.
    pub fn with_profiler(profiler: Arc<dyn PhaseProfiler>) -> Self {
        let mut tracker = Self::new();
        tracker.profiler = Some(profiler);
        tracker
    }

    /// Enable or disable tracking.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Whether tracking is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Register an allocation and return a token that releases it on drop.
    pub fn register(
        self: &Arc<Self>,
        ptr: u64,
        size: usize,
        kind: MemoryKind,
        label: &str,
    ) -> AllocationToken {
        let id = self.track_alloc(ptr, size, kind, label);
        AllocationToken {
            tracker: Arc::clone(self),
            id,
        }
    }

    /// Record an allocation. Returns 0 when tracking is disabled.
    pub fn track_alloc(&self, ptr: u64, size: usize, kind: MemoryKind, label: &str) -> u64 {
        if !self.is_enabled() {
            return 0;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let new_bytes = self.current_bytes.fetch_add(size as u64, Ordering::Relaxed) + size as u64;
        self.peak_bytes.fetch_max(new_bytes, Ordering::Relaxed);
        self.total_allocations.fetch_add(1, Ordering::Relaxed);

        self.allocations.write().insert(
            id,
            TrackedAllocation {
                id,
                ptr,
                size,
                kind,
                label: label.to_string(),
                allocated_at: Instant::now(),
            },
        );

        debug!(id, ptr, size, kind = kind.label(), label, "alloc");
        if let Some(profiler) = &self.profiler {
            profiler.mark(&format!("Alloc {} {} ({} bytes)", kind.label(), label, size));
        }

        id
    }

    /// Record a release. Unknown IDs (and 0) are ignored.
    pub fn track_free(&self, id: u64) -> Option<TrackedAllocation> {
        if id == 0 {
            return None;
        }

        let allocation = self.allocations.write().remove(&id)?;
        self.current_bytes
            .fetch_sub(allocation.size as u64, Ordering::Relaxed);
        self.total_deallocations.fetch_add(1, Ordering::Relaxed);

        debug!(id, size = allocation.size, label = %allocation.label, "free");
        if let Some(profiler) = &self.profiler {
            profiler.mark(&format!(
                "Free {} {} ({} bytes)",
                allocation.kind.label(),
                allocation.label,
                allocation.size
            ));
        }

        Some(allocation)
    }

    /// Number of live allocations.
    pub fn outstanding(&self) -> usize {
        self.allocations.read().len()
    }

    /// Number of live allocations of one kind.
    pub fn outstanding_of(&self, kind: MemoryKind) -> usize {
        self.allocations
            .read()
            .values()
            .filter(|a| a.kind == kind)
            .count()
    }

    /// Live bytes.
    pub fn current_usage(&self) -> u64 {
        self.current_bytes.load(Ordering::Relaxed)
    }

    /// Peak live bytes.
    pub fn peak_usage(&self) -> u64 {
        self.peak_bytes.load(Ordering::Relaxed)
    }

    /// Allocations registered so far.
    pub fn total_allocations(&self) -> u64 {
        self.total_allocations.load(Ordering::Relaxed)
    }

    /// Allocations released so far.
    pub fn total_deallocations(&self) -> u64 {
        self.total_deallocations.load(Ordering::Relaxed)
    }

    /// All live allocations.
    pub fn active_allocations(&self) -> Vec<TrackedAllocation> {
        self.allocations.read().values().cloned().collect()
    }

    /// Live allocations, or `None` if everything was released.
    pub fn detect_leaks(&self) -> Option<Vec<TrackedAllocation>> {
        let leaks = self.active_allocations();
        if leaks.is_empty() {
            None
        } else {
            Some(leaks)
        }
    }

    /// Snapshot statistics.
    pub fn stats(&self) -> TrackerStats {
        let allocations = self.allocations.read();
        let mut by_kind: HashMap<MemoryKind, KindStats> = HashMap::new();
        for alloc in allocations.values() {
            let entry = by_kind.entry(alloc.kind).or_default();
            entry.count += 1;
            entry.bytes += alloc.size as u64;
        }

        TrackerStats {
            current_bytes: self.current_usage(),
            peak_bytes: self.peak_usage(),
            total_allocations: self.total_allocations(),
            total_deallocations: self.total_deallocations(),
            by_kind,
        }
    }
}

impl Default for AllocationTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AllocationTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllocationTracker")
            .field("outstanding", &self.outstanding())
            .field("current_bytes", &self.current_usage())
            .field("peak_bytes", &self.peak_usage())
            .finish()
    }
}

/// Releases its allocation record when dropped.
#[derive(Debug)]
pub struct AllocationToken {
    tracker: Arc<AllocationTracker>,
    id: u64,
}

impl AllocationToken {
    /// Allocation ID (0 if tracking was disabled).
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for AllocationToken {
    fn drop(&mut self) {
        self.tracker.track_free(self.id);
    }
}
