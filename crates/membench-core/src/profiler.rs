//! Bandwidth profiler.
//!
//! Every direction follows the same protocol: untimed warm-up copies, a timed
//! phase, bandwidth arithmetic from [`crate::timing`], then a content check.
//! Host-to-host copies are timed with a [`Stopwatch`]; anything touching the
//! device is timed with the engine's [`EventTimer`].

use std::time::Duration;

use tracing::{debug, warn};

use crate::buffer::{fill_zero, Element, HostBuffer, ELEMENT_SIZE};
use crate::config::BenchConfig;
use crate::engine::{CopyEngine, DeviceBuffer, EventTimer};
use crate::error::Result;
use crate::policy::PolicyGuard;
use crate::report::{BandwidthFigure, Direction, Phase, RecordedFailure, ReportBlock};
use crate::timing::{round_trip_bandwidth, Stopwatch, TimingSample};
use crate::verify::{verify_copy, Verification};

/// Runs the per-direction measurements against one engine.
pub struct BandwidthProfiler<'a, E: CopyEngine> {
    engine: &'a E,
    config: &'a BenchConfig,
    guard: PolicyGuard,
}

impl<'a, E: CopyEngine> BandwidthProfiler<'a, E> {
    /// Create a profiler for an engine and configuration.
    pub fn new(engine: &'a E, config: &'a BenchConfig) -> Self {
        Self {
            engine,
            config,
            guard: PolicyGuard::new(config.error_policy),
        }
    }

    /// Failures recorded so far.
    pub fn failures(&self) -> &[RecordedFailure] {
        self.guard.log().entries()
    }

    /// Consume the profiler and return every recorded failure.
    pub fn into_failures(self) -> Vec<RecordedFailure> {
        self.guard.into_failures()
    }

    /// Host-to-host copy bandwidth between two buffers of one allocation
    /// strategy.
    ///
    /// Times `src -> dst` and `dst -> src` separately, counting read and
    /// write, and reports their round-trip average. Host copies have no
    /// error path; a bad copy shows up only in the content check.
    pub fn profile_host_to_host<H: HostBuffer>(
        &mut self,
        src: &mut H,
        dst: &mut H,
        label: &str,
    ) -> Result<ReportBlock> {
        let phase = Phase::host_to_host(src.allocation());
        let count = src.len().min(dst.len());
        let bytes = count * ELEMENT_SIZE;
        let iterations = self.config.timed_iterations;
        debug!(label, count, "host to host");

        for _ in 0..self.config.host_warmup_iterations {
            host_copy(src.as_slice(), dst.as_mut_slice(), count);
        }

        let watch = Stopwatch::start();
        for _ in 0..iterations {
            host_copy(src.as_slice(), dst.as_mut_slice(), count);
        }
        let forward = TimingSample::read_write(watch.elapsed(), iterations, bytes);

        // The backward leg overwrites src with dst, so the forward copy is
        // checked before it runs.
        let forward_check = verify_copy(src.as_slice(), dst.as_slice());

        let watch = Stopwatch::start();
        for _ in 0..iterations {
            host_copy(dst.as_slice(), src.as_mut_slice(), count);
        }
        let backward = TimingSample::read_write(watch.elapsed(), iterations, bytes);

        let figure = BandwidthFigure {
            direction: Direction::HostToHost,
            gbps: round_trip_bandwidth(forward, backward),
        };

        let verification = match forward_check {
            Verification::Match => verify_copy(dst.as_slice(), src.as_slice()),
            mismatch => mismatch,
        };
        self.note_verification(phase, label, &verification);

        Ok(ReportBlock::new(phase, vec![figure], verification))
    }

    /// Host-to-device and device-to-host bandwidth through one device
    /// buffer.
    ///
    /// Warm-up round trips go `src -> device -> dst`. The two legs are then
    /// timed independently and reported as separate figures.
    pub fn profile_host_device<H: HostBuffer>(
        &mut self,
        src: &H,
        dst: &mut H,
        device: &mut E::DeviceBuffer,
        label: &str,
    ) -> Result<ReportBlock> {
        let phase = Phase::transfers(src.allocation());
        let engine = self.engine;
        let bytes = device.len() * ELEMENT_SIZE;
        let iterations = self.config.transfer_iterations;
        debug!(label, count = device.len(), "host/device transfers");

        // dst may already hold the source pattern from an earlier phase;
        // clear it so only copies that land here can pass the check.
        fill_zero(dst.as_mut_slice());

        for _ in 0..self.config.device_warmup_iterations {
            let up = self.step(phase, engine.copy_host_to_device(src.as_slice(), device))?;
            let down = self.step(phase, engine.copy_device_to_host(device, dst.as_mut_slice()))?;
            if !(up && down) {
                break;
            }
        }

        let mut timer = self.guard.check(phase, engine.create_timer())?;

        let h2d = self.timed(phase, timer.as_mut(), iterations, |e| {
            e.copy_host_to_device(src.as_slice(), device)
        })?;
        fill_zero(dst.as_mut_slice());
        let d2h = self.timed(phase, timer.as_mut(), iterations, |e| {
            e.copy_device_to_host(device, dst.as_mut_slice())
        })?;

        let figures = vec![
            BandwidthFigure {
                direction: Direction::HostToDevice,
                gbps: h2d.and_then(|t| TimingSample::one_way(t, iterations, bytes).bandwidth()),
            },
            BandwidthFigure {
                direction: Direction::DeviceToHost,
                gbps: d2h.and_then(|t| TimingSample::one_way(t, iterations, bytes).bandwidth()),
            },
        ];

        let verification = verify_copy(src.as_slice(), dst.as_slice());
        self.note_verification(phase, label, &verification);

        Ok(ReportBlock::new(phase, figures, verification))
    }

    /// Device-to-device copy bandwidth.
    ///
    /// Times `a -> b` and `b -> a` separately and reports their round-trip
    /// average. Both buffers are then read back into temporary pinned
    /// buffers, used only for the content check and freed before returning.
    pub fn profile_device_to_device(
        &mut self,
        a: &mut E::DeviceBuffer,
        b: &mut E::DeviceBuffer,
    ) -> Result<ReportBlock> {
        let phase = Phase::DeviceToDevice;
        let engine = self.engine;
        let count = a.len();
        let bytes = count * ELEMENT_SIZE;
        let iterations = self.config.timed_iterations;

        for _ in 0..self.config.device_warmup_iterations {
            let forward = self.step(phase, engine.copy_device_to_device(a, b))?;
            let backward = self.step(phase, engine.copy_device_to_device(b, a))?;
            if !(forward && backward) {
                break;
            }
        }

        let mut timer = self.guard.check(phase, engine.create_timer())?;

        let forward = self.timed(phase, timer.as_mut(), iterations, |e| {
            e.copy_device_to_device(a, b)
        })?;
        let backward = self.timed(phase, timer.as_mut(), iterations, |e| {
            e.copy_device_to_device(b, a)
        })?;
        drop(timer);

        let gbps = match (forward, backward) {
            (Some(f), Some(r)) => round_trip_bandwidth(
                TimingSample::read_write(f, iterations, bytes),
                TimingSample::read_write(r, iterations, bytes),
            ),
            _ => None,
        };
        let figure = BandwidthFigure {
            direction: Direction::DeviceToDevice,
            gbps,
        };

        let mut readback_a = engine.alloc_pinned(count, "h_aReadback")?;
        let mut readback_b = engine.alloc_pinned(count, "h_bReadback")?;
        // Distinct bit patterns, so a readback that never lands cannot match
        readback_a.as_mut_slice().fill(Element::NAN);
        readback_b.as_mut_slice().fill(-Element::NAN);
        self.step(phase, engine.copy_device_to_host(a, readback_a.as_mut_slice()))?;
        self.step(phase, engine.copy_device_to_host(b, readback_b.as_mut_slice()))?;

        let verification = verify_copy(readback_a.as_slice(), readback_b.as_slice());
        self.note_verification(phase, "Device to device", &verification);

        Ok(ReportBlock::new(phase, vec![figure], verification))
    }

    /// Run one untimed engine operation through the policy. Returns whether
    /// it succeeded.
    fn step(&mut self, phase: Phase, result: Result<()>) -> Result<bool> {
        Ok(self.guard.check(phase, result)?.is_some())
    }

    /// Time `iterations` runs of `op` between the timer's markers.
    ///
    /// Returns `None` if there is no timer or any operation failed under the
    /// continue policy. Without a timer the copies still run so that data
    /// keeps flowing to the content check.
    fn timed<F>(
        &mut self,
        phase: Phase,
        timer: Option<&mut E::Timer>,
        iterations: u32,
        mut op: F,
    ) -> Result<Option<Duration>>
    where
        F: FnMut(&E) -> Result<()>,
    {
        let engine = self.engine;

        let Some(timer) = timer else {
            for _ in 0..iterations {
                if !self.step(phase, op(engine))? {
                    break;
                }
            }
            return Ok(None);
        };

        if self.guard.check(phase, timer.start())?.is_none() {
            return Ok(None);
        }
        let mut completed = true;
        for _ in 0..iterations {
            if !self.step(phase, op(engine))? {
                completed = false;
                break;
            }
        }
        if self.guard.check(phase, timer.stop())?.is_none() {
            return Ok(None);
        }
        let elapsed = self.guard.check(phase, timer.elapsed())?;

        Ok(if completed { elapsed } else { None })
    }

    fn note_verification(&mut self, phase: Phase, label: &str, verification: &Verification) {
        if let Verification::Mismatch {
            index,
            expected,
            actual,
        } = verification
        {
            let message = format!(
                "{} copy differs at element {}: expected {:?}, found {:?}",
                label, index, expected, actual
            );
            warn!(phase = phase.range_label(), "{}", message);
            self.guard.record_mismatch(phase, message);
        }
    }
}

fn host_copy(src: &[Element], dst: &mut [Element], count: usize) {
    dst[..count].copy_from_slice(&src[..count]);
}
