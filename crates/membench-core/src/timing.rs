//! Clocks, timing samples and bandwidth arithmetic.
//!
//! All bandwidth figures use one convention: bytes moved divided by elapsed
//! seconds, divided by [`BYTES_PER_GB`].

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Decimal gigabyte, as used for GB/s figures.
pub const BYTES_PER_GB: f64 = 1_000_000_000.0;

/// Monotonic wall-clock stopwatch.
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    started: Instant,
}

impl Stopwatch {
    /// Start a stopwatch now.
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Time since [`Stopwatch::start`].
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// A bandwidth figure in GB/s. Always finite and strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bandwidth(f64);

impl Bandwidth {
    /// Bandwidth for `bytes` moved in `elapsed`.
    ///
    /// Returns `None` when the elapsed time is zero or the result would not
    /// be a finite positive number.
    pub fn from_bytes(bytes: u64, elapsed: Duration) -> Option<Self> {
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 || bytes == 0 {
            return None;
        }
        Self::from_gbps(bytes as f64 / secs / BYTES_PER_GB)
    }

    /// Wrap a raw GB/s value, rejecting non-finite and non-positive values.
    pub fn from_gbps(gbps: f64) -> Option<Self> {
        if gbps.is_finite() && gbps > 0.0 {
            Some(Self(gbps))
        } else {
            None
        }
    }

    /// Value in GB/s.
    pub fn gbps(&self) -> f64 {
        self.0
    }
}

impl fmt::Display for Bandwidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// One timed measurement: how long it took to move how many bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingSample {
    /// Elapsed time of the timed region.
    pub elapsed: Duration,
    /// Bytes moved in the timed region (read and write counted separately
    /// where applicable).
    pub bytes: u64,
}

impl TimingSample {
    /// Sample for a one-way transfer: `iterations` copies of `bytes` each.
    pub fn one_way(elapsed: Duration, iterations: u32, bytes: usize) -> Self {
        Self {
            elapsed,
            bytes: iterations as u64 * bytes as u64,
        }
    }

    /// Sample for an in-memory copy where every byte is read once and
    /// written once.
    pub fn read_write(elapsed: Duration, iterations: u32, bytes: usize) -> Self {
        Self {
            elapsed,
            bytes: 2 * iterations as u64 * bytes as u64,
        }
    }

    /// Bandwidth of this sample.
    pub fn bandwidth(&self) -> Option<Bandwidth> {
        Bandwidth::from_bytes(self.bytes, self.elapsed)
    }
}

/// Combine two independently timed legs of a round trip.
///
/// The legs' times are averaged and divided into the average bytes per leg,
/// so for equal legs of `2 * iterations * bytes` this is
/// `2 * iterations * bytes / ((t_ab + t_ba) / 2)`.
pub fn round_trip_bandwidth(forward: TimingSample, backward: TimingSample) -> Option<Bandwidth> {
    let mean_elapsed = (forward.elapsed + backward.elapsed) / 2;
    let mean_bytes = (forward.bytes + backward.bytes) / 2;
    Bandwidth::from_bytes(mean_bytes, mean_elapsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB16: usize = 16 * 1024 * 1024;

    #[test]
    fn test_bandwidth_basic() {
        let bw = Bandwidth::from_bytes(2_000_000_000, Duration::from_secs(1)).unwrap();
        assert!((bw.gbps() - 2.0).abs() < 1e-12);
        assert_eq!(bw.to_string(), "2.00");
    }

    #[test]
    fn test_zero_elapsed_is_guarded() {
        assert!(Bandwidth::from_bytes(1024, Duration::ZERO).is_none());
        assert!(Bandwidth::from_bytes(0, Duration::from_millis(1)).is_none());
    }

    #[test]
    fn test_non_finite_rejected() {
        assert!(Bandwidth::from_gbps(f64::INFINITY).is_none());
        assert!(Bandwidth::from_gbps(f64::NAN).is_none());
        assert!(Bandwidth::from_gbps(-1.0).is_none());
        assert!(Bandwidth::from_gbps(0.0).is_none());
    }

    #[test]
    fn test_tiny_elapsed_is_finite() {
        let bw = Bandwidth::from_bytes(u64::MAX, Duration::from_nanos(1)).unwrap();
        assert!(bw.gbps().is_finite());
        assert!(bw.gbps() > 0.0);
    }

    #[test]
    fn test_one_way_sample() {
        // 16 MiB in 2 ms
        let sample = TimingSample::one_way(Duration::from_millis(2), 1, MB16);
        assert_eq!(sample.bytes, MB16 as u64);
        let bw = sample.bandwidth().unwrap();
        assert!((bw.gbps() - 8.388608).abs() < 1e-9);
    }

    #[test]
    fn test_read_write_sample_doubles_bytes() {
        let sample = TimingSample::read_write(Duration::from_millis(100), 100, MB16);
        assert_eq!(sample.bytes, 2 * 100 * MB16 as u64);
    }

    #[test]
    fn test_round_trip_uses_mean_time() {
        let bytes = 4096usize;
        let iters = 100u32;
        let forward = TimingSample::read_write(Duration::from_micros(300), iters, bytes);
        let backward = TimingSample::read_write(Duration::from_micros(500), iters, bytes);

        let bw = round_trip_bandwidth(forward, backward).unwrap();

        let expected = 2.0 * iters as f64 * bytes as f64 / ((300e-6 + 500e-6) / 2.0) / BYTES_PER_GB;
        assert!((bw.gbps() - expected).abs() / expected < 1e-9);

        // Averaging the two bandwidths instead would give a different number
        let mean_of_rates = (forward.bandwidth().unwrap().gbps()
            + backward.bandwidth().unwrap().gbps())
            / 2.0;
        assert!((bw.gbps() - mean_of_rates).abs() > 1e-3);
    }

    #[test]
    fn test_round_trip_symmetric() {
        let a = TimingSample::read_write(Duration::from_millis(3), 10, 1024);
        let b = TimingSample::read_write(Duration::from_millis(7), 10, 1024);
        assert_eq!(round_trip_bandwidth(a, b), round_trip_bandwidth(b, a));
    }

    #[test]
    fn test_round_trip_zero_time() {
        let a = TimingSample::read_write(Duration::ZERO, 10, 1024);
        assert!(round_trip_bandwidth(a, a).is_none());
    }

    #[test]
    fn test_stopwatch_monotonic() {
        let watch = Stopwatch::start();
        let first = watch.elapsed();
        let second = watch.elapsed();
        assert!(second >= first);
    }
}
