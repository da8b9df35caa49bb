//! Host-emulated copy engine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info};

use membench_core::buffer::{Element, ELEMENT_SIZE};
use membench_core::engine::{check_lengths, Backend, CopyEngine, DeviceBuffer, EventTimer};
use membench_core::error::{BenchError, Result};
use membench_core::report::Direction;
use membench_core::tracker::{AllocationToken, AllocationTracker, MemoryKind};

use crate::pinned::LockedHostBuffer;

/// Faults the engine injects on request.
///
/// Corruption adds one to the element at the given index of the copy's
/// destination, so repeated corrupted round trips keep the two sides apart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultInjection {
    /// Corrupt this element of every device-to-host destination.
    pub corrupt_d2h_at: Option<usize>,
    /// Corrupt this element of every device-to-device destination.
    pub corrupt_d2d_at: Option<usize>,
    /// Fail every device allocation.
    pub fail_device_alloc: bool,
    /// Fail every timer creation.
    pub fail_timer_creation: bool,
    /// Fail every host-to-device copy.
    pub fail_h2d: bool,
    /// Fail every device-to-host copy.
    pub fail_d2h: bool,
}

impl FaultInjection {
    /// No faults.
    pub fn none() -> Self {
        Self::default()
    }

    /// Corrupt device-to-host copies at `index`.
    pub fn corrupt_d2h_at(mut self, index: usize) -> Self {
        self.corrupt_d2h_at = Some(index);
        self
    }

    /// Corrupt device-to-device copies at `index`.
    pub fn corrupt_d2d_at(mut self, index: usize) -> Self {
        self.corrupt_d2d_at = Some(index);
        self
    }

    /// Fail device allocations.
    pub fn fail_device_alloc(mut self) -> Self {
        self.fail_device_alloc = true;
        self
    }

    /// Fail timer creation.
    pub fn fail_timer_creation(mut self) -> Self {
        self.fail_timer_creation = true;
        self
    }

    /// Fail host-to-device copies.
    pub fn fail_h2d(mut self) -> Self {
        self.fail_h2d = true;
        self
    }

    /// Fail device-to-host copies.
    pub fn fail_d2h(mut self) -> Self {
        self.fail_d2h = true;
        self
    }
}

/// Operation counters.
#[derive(Debug, Default)]
pub struct EngineStats {
    device_allocs: AtomicU64,
    pinned_allocs: AtomicU64,
    h2d_copies: AtomicU64,
    d2h_copies: AtomicU64,
    d2d_copies: AtomicU64,
    fills: AtomicU64,
    timers_created: AtomicU64,
    timer_records: AtomicU64,
    timer_reads: AtomicU64,
    synchronizes: AtomicU64,
    resets: AtomicU64,
}

impl EngineStats {
    /// Snapshot the counters.
    pub fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            device_allocs: self.device_allocs.load(Ordering::Relaxed),
            pinned_allocs: self.pinned_allocs.load(Ordering::Relaxed),
            h2d_copies: self.h2d_copies.load(Ordering::Relaxed),
            d2h_copies: self.d2h_copies.load(Ordering::Relaxed),
            d2d_copies: self.d2d_copies.load(Ordering::Relaxed),
            fills: self.fills.load(Ordering::Relaxed),
            timers_created: self.timers_created.load(Ordering::Relaxed),
            timer_records: self.timer_records.load(Ordering::Relaxed),
            timer_reads: self.timer_reads.load(Ordering::Relaxed),
            synchronizes: self.synchronizes.load(Ordering::Relaxed),
            resets: self.resets.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time copy of [`EngineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStatsSnapshot {
    /// Device allocations.
    pub device_allocs: u64,
    /// Pinned host allocations.
    pub pinned_allocs: u64,
    /// Host-to-device copies attempted.
    pub h2d_copies: u64,
    /// Device-to-host copies attempted.
    pub d2h_copies: u64,
    /// Device-to-device copies attempted.
    pub d2d_copies: u64,
    /// Device fills.
    pub fills: u64,
    /// Timers created.
    pub timers_created: u64,
    /// Start and stop markers recorded.
    pub timer_records: u64,
    /// Elapsed-time reads.
    pub timer_reads: u64,
    /// Synchronize calls.
    pub synchronizes: u64,
    /// Engine resets.
    pub resets: u64,
}

impl EngineStatsSnapshot {
    /// Counters accumulated since `earlier`.
    pub fn since(&self, earlier: &EngineStatsSnapshot) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            device_allocs: self.device_allocs.saturating_sub(earlier.device_allocs),
            pinned_allocs: self.pinned_allocs.saturating_sub(earlier.pinned_allocs),
            h2d_copies: self.h2d_copies.saturating_sub(earlier.h2d_copies),
            d2h_copies: self.d2h_copies.saturating_sub(earlier.d2h_copies),
            d2d_copies: self.d2d_copies.saturating_sub(earlier.d2d_copies),
            fills: self.fills.saturating_sub(earlier.fills),
            timers_created: self.timers_created.saturating_sub(earlier.timers_created),
            timer_records: self.timer_records.saturating_sub(earlier.timer_records),
            timer_reads: self.timer_reads.saturating_sub(earlier.timer_reads),
            synchronizes: self.synchronizes.saturating_sub(earlier.synchronizes),
            resets: self.resets.saturating_sub(earlier.resets),
        }
    }
}

/// "Device" memory: a separate heap allocation.
#[derive(Debug)]
pub struct CpuDeviceBuffer {
    data: Vec<Element>,
    _token: AllocationToken,
}

impl CpuDeviceBuffer {
    /// Contents, for inspection in tests.
    pub fn as_slice(&self) -> &[Element] {
        &self.data
    }
}

impl DeviceBuffer for CpuDeviceBuffer {
    fn len(&self) -> usize {
        self.data.len()
    }
}

/// Wall-clock timer with event-timer semantics.
#[derive(Debug)]
pub struct CpuTimer {
    start: Option<Instant>,
    stop: Option<Instant>,
    stats: Arc<EngineStats>,
}

impl EventTimer for CpuTimer {
    fn start(&mut self) -> Result<()> {
        EngineStats::bump(&self.stats.timer_records);
        self.start = Some(Instant::now());
        self.stop = None;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if self.start.is_none() {
            return Err(BenchError::InvalidTimerState {
                expected: "started",
                actual: "idle",
            });
        }
        EngineStats::bump(&self.stats.timer_records);
        self.stop = Some(Instant::now());
        Ok(())
    }

    fn elapsed(&mut self) -> Result<Duration> {
        EngineStats::bump(&self.stats.timer_reads);
        match (self.start, self.stop) {
            (Some(start), Some(stop)) => Ok(stop.saturating_duration_since(start)),
            (Some(_), None) => Err(BenchError::InvalidTimerState {
                expected: "stopped",
                actual: "running",
            }),
            _ => Err(BenchError::InvalidTimerState {
                expected: "stopped",
                actual: "idle",
            }),
        }
    }
}

/// Copy engine whose "device" is host memory.
///
/// Runs the full measurement protocol anywhere, counts every operation and
/// injects faults on request.
pub struct CpuEngine {
    ordinal: usize,
    name: String,
    tracker: Arc<AllocationTracker>,
    stats: Arc<EngineStats>,
    faults: RwLock<FaultInjection>,
    lock_pinned: bool,
}

impl CpuEngine {
    /// Create an engine for a virtual device ordinal.
    pub fn new(ordinal: usize) -> Result<Self> {
        Self::with_tracker(ordinal, Arc::new(AllocationTracker::new()))
    }

    /// Create an engine that records allocations in `tracker`.
    pub fn with_tracker(ordinal: usize, tracker: Arc<AllocationTracker>) -> Result<Self> {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let name = format!("Host-emulated device {} ({} threads)", ordinal, threads);
        info!("Initializing host-emulated copy engine: {}", name);

        Ok(Self {
            ordinal,
            name,
            tracker,
            stats: Arc::new(EngineStats::default()),
            faults: RwLock::new(FaultInjection::none()),
            lock_pinned: true,
        })
    }

    /// Replace the injected faults.
    pub fn with_faults(self, faults: FaultInjection) -> Self {
        *self.faults.write() = faults;
        self
    }

    /// Change the injected faults on a live engine.
    pub fn set_faults(&self, faults: FaultInjection) {
        *self.faults.write() = faults;
    }

    /// Whether pinned buffers should be `mlock`ed.
    pub fn with_page_locking(mut self, lock: bool) -> Self {
        self.lock_pinned = lock;
        self
    }

    /// Shared operation counters. Stay readable after [`CopyEngine::reset`].
    pub fn stats(&self) -> Arc<EngineStats> {
        Arc::clone(&self.stats)
    }

    fn corrupt(dst: &mut [Element], index: Option<usize>) {
        if let Some(slot) = index.and_then(|i| dst.get_mut(i)) {
            *slot += 1.0;
        }
    }
}

impl CopyEngine for CpuEngine {
    type DeviceBuffer = CpuDeviceBuffer;
    type PinnedBuffer = LockedHostBuffer;
    type Timer = CpuTimer;

    fn backend(&self) -> Backend {
        Backend::Cpu
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

    fn alloc_device(&self, len: usize, label: &str) -> Result<CpuDeviceBuffer> {
        EngineStats::bump(&self.stats.device_allocs);
        let size = len * ELEMENT_SIZE;
        if self.faults.read().fail_device_alloc {
            return Err(BenchError::DeviceAllocationFailed {
                size,
                reason: "injected fault".to_string(),
            });
        }
        if len == 0 {
            return Err(BenchError::DeviceAllocationFailed {
                size,
                reason: "cannot allocate zero-length buffer".to_string(),
            });
        }

        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|e| BenchError::DeviceAllocationFailed {
                size,
                reason: e.to_string(),
            })?;
        data.resize(len, 0.0);

        let token = self
            .tracker
            .register(data.as_ptr() as u64, size, MemoryKind::Device, label);
        debug!(label, size, "device alloc");

        Ok(CpuDeviceBuffer {
            data,
            _token: token,
        })
    }

    fn alloc_pinned(&self, len: usize, label: &str) -> Result<LockedHostBuffer> {
        EngineStats::bump(&self.stats.pinned_allocs);
        LockedHostBuffer::new(len, self.lock_pinned, &self.tracker, label)
    }

    fn copy_host_to_device(&self, src: &[Element], dst: &mut CpuDeviceBuffer) -> Result<()> {
        EngineStats::bump(&self.stats.h2d_copies);
        if self.faults.read().fail_h2d {
            return Err(BenchError::TransferFailed {
                direction: Direction::HostToDevice.short_label(),
                reason: "injected fault".to_string(),
            });
        }
        check_lengths(src.len(), dst.data.len())?;
        dst.data.copy_from_slice(src);
        Ok(())
    }

    fn copy_device_to_host(&self, src: &CpuDeviceBuffer, dst: &mut [Element]) -> Result<()> {
        EngineStats::bump(&self.stats.d2h_copies);
        if self.faults.read().fail_d2h {
            return Err(BenchError::TransferFailed {
                direction: Direction::DeviceToHost.short_label(),
                reason: "injected fault".to_string(),
            });
        }
        check_lengths(src.data.len(), dst.len())?;
        dst.copy_from_slice(&src.data);
        Self::corrupt(dst, self.faults.read().corrupt_d2h_at);
        Ok(())
    }

    fn copy_device_to_device(&self, src: &CpuDeviceBuffer, dst: &mut CpuDeviceBuffer) -> Result<()> {
        EngineStats::bump(&self.stats.d2d_copies);
        check_lengths(src.data.len(), dst.data.len())?;
        dst.data.copy_from_slice(&src.data);
        Self::corrupt(&mut dst.data, self.faults.read().corrupt_d2d_at);
        Ok(())
    }

    fn fill_device(&self, dst: &mut CpuDeviceBuffer, value: Element) -> Result<()> {
        EngineStats::bump(&self.stats.fills);
        dst.data.fill(value);
        Ok(())
    }

    fn create_timer(&self) -> Result<CpuTimer> {
        EngineStats::bump(&self.stats.timers_created);
        if self.faults.read().fail_timer_creation {
            return Err(BenchError::TimerError("injected fault".to_string()));
        }
        Ok(CpuTimer {
            start: None,
            stop: None,
            stats: Arc::clone(&self.stats),
        })
    }

    fn synchronize(&self) -> Result<()> {
        EngineStats::bump(&self.stats.synchronizes);
        Ok(())
    }

    fn reset(self) -> Result<()> {
        self.synchronize()?;
        EngineStats::bump(&self.stats.resets);
        info!(ordinal = self.ordinal, "host-emulated engine reset");
        Ok(())
    }
}

impl std::fmt::Debug for CpuEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpuEngine")
            .field("ordinal", &self.ordinal)
            .field("name", &self.name)
            .field("faults", &*self.faults.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use membench_core::buffer::{fill_ramp, HostBuffer};

    #[test]
    fn test_engine_identity() {
        let engine = CpuEngine::new(3).unwrap();
        assert_eq!(engine.backend(), Backend::Cpu);
        assert_eq!(engine.ordinal(), 3);
        assert!(engine.device_name().starts_with("Host-emulated device 3"));
    }

    #[test]
    fn test_round_trip_copy() {
        let engine = CpuEngine::new(0).unwrap();
        let mut src = vec![0.0f32; 1024];
        fill_ramp(&mut src);
        let mut dst = vec![0.0f32; 1024];

        let mut dev = engine.alloc_device(1024, "d_a").unwrap();
        engine.copy_host_to_device(&src, &mut dev).unwrap();
        engine.copy_device_to_host(&dev, &mut dst).unwrap();
        assert_eq!(src, dst);

        let mut other = engine.alloc_device(1024, "d_b").unwrap();
        engine.copy_device_to_device(&dev, &mut other).unwrap();
        assert_eq!(other.as_slice(), src.as_slice());

        let stats = engine.stats().snapshot();
        assert_eq!(stats.h2d_copies, 1);
        assert_eq!(stats.d2h_copies, 1);
        assert_eq!(stats.d2d_copies, 1);
        assert_eq!(stats.device_allocs, 2);
    }

    #[test]
    fn test_length_mismatch_is_copy_error() {
        let engine = CpuEngine::new(0).unwrap();
        let mut dev = engine.alloc_device(16, "d_a").unwrap();
        let err = engine.copy_host_to_device(&[0.0; 8], &mut dev).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_timer_states() {
        let engine = CpuEngine::new(0).unwrap();
        let mut timer = engine.create_timer().unwrap();

        assert!(timer.elapsed().is_err());
        assert!(timer.stop().is_err());

        timer.start().unwrap();
        assert!(matches!(
            timer.elapsed(),
            Err(BenchError::InvalidTimerState { actual: "running", .. })
        ));
        timer.stop().unwrap();
        assert!(timer.elapsed().is_ok());
    }

    #[test]
    fn test_injected_faults() {
        let engine = CpuEngine::new(0).unwrap().with_faults(
            FaultInjection::none()
                .corrupt_d2h_at(5)
                .fail_timer_creation(),
        );
        let src = vec![1.0f32; 16];
        let mut dst = vec![0.0f32; 16];
        let mut dev = engine.alloc_device(16, "d_a").unwrap();
        engine.copy_host_to_device(&src, &mut dev).unwrap();
        engine.copy_device_to_host(&dev, &mut dst).unwrap();
        assert_eq!(dst[4], 1.0);
        assert_eq!(dst[5], 2.0);

        assert!(matches!(engine.create_timer(), Err(BenchError::TimerError(_))));

        engine.set_faults(
            FaultInjection::none()
                .fail_device_alloc()
                .fail_h2d()
                .fail_d2h(),
        );
        assert!(matches!(
            engine.alloc_device(16, "d_b"),
            Err(BenchError::DeviceAllocationFailed { .. })
        ));
        assert!(matches!(
            engine.copy_host_to_device(&src, &mut dev),
            Err(BenchError::TransferFailed { direction: "H2D", .. })
        ));
        let before = dst.clone();
        assert!(matches!(
            engine.copy_device_to_host(&dev, &mut dst),
            Err(BenchError::TransferFailed { direction: "D2H", .. })
        ));
        assert_eq!(dst, before);
    }

    #[test]
    fn test_corruption_out_of_range_ignored() {
        let engine = CpuEngine::new(0)
            .unwrap()
            .with_faults(FaultInjection::none().corrupt_d2d_at(100));
        let a = engine.alloc_device(4, "d_a").unwrap();
        let mut b = engine.alloc_device(4, "d_b").unwrap();
        engine.copy_device_to_device(&a, &mut b).unwrap();
        assert_eq!(b.as_slice(), &[0.0; 4]);
    }

    #[test]
    fn test_allocations_tracked_and_reset() {
        let tracker = Arc::new(AllocationTracker::new());
        let engine = CpuEngine::with_tracker(0, Arc::clone(&tracker))
            .unwrap()
            .with_page_locking(false);
        let stats = engine.stats();

        let dev = engine.alloc_device(64, "d_a").unwrap();
        let pinned = engine.alloc_pinned(64, "h_aPinned").unwrap();
        assert_eq!(pinned.len(), 64);
        assert_eq!(tracker.outstanding_of(MemoryKind::Device), 1);
        assert_eq!(tracker.outstanding_of(MemoryKind::Pinned), 1);

        drop(dev);
        drop(pinned);
        engine.reset().unwrap();

        assert_eq!(tracker.outstanding(), 0);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.resets, 1);
        assert_eq!(snapshot.synchronizes, 1);
    }

    #[test]
    fn test_snapshot_since() {
        let engine = CpuEngine::new(0).unwrap();
        let before = engine.stats().snapshot();
        engine.synchronize().unwrap();
        engine.synchronize().unwrap();
        let delta = engine.stats().snapshot().since(&before);
        assert_eq!(delta.synchronizes, 2);
        assert_eq!(delta.h2d_copies, 0);
    }
}
