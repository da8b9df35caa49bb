//! Named range markers around benchmark phases.
//!
//! Ranges exist purely so an external profiler (Nsight Systems, a tracing
//! subscriber) can attribute time to phases. They never change what the
//! profiler measures or prints.

use std::any::Any;
use std::time::{Duration, Instant};

use tracing::{debug, info_span};

/// ARGB color attached to ranges and markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfilerColor {
    /// Red component (0-255).
    pub r: u8,
    /// Green component (0-255).
    pub g: u8,
    /// Blue component (0-255).
    pub b: u8,
    /// Alpha component (0-255).
    pub a: u8,
}

impl ProfilerColor {
    /// Create an opaque color.
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Red color.
    pub const RED: Self = Self::new(255, 0, 0);
    /// Green color.
    pub const GREEN: Self = Self::new(0, 255, 0);
    /// Blue color.
    pub const BLUE: Self = Self::new(0, 0, 255);
    /// Yellow color.
    pub const YELLOW: Self = Self::new(255, 255, 0);
    /// Cyan color.
    pub const CYAN: Self = Self::new(0, 255, 255);
    /// Magenta color.
    pub const MAGENTA: Self = Self::new(255, 0, 255);
    /// Orange color.
    pub const ORANGE: Self = Self::new(255, 165, 0);

    /// Pack as 0xAARRGGBB.
    pub fn to_argb(self) -> u32 {
        ((self.a as u32) << 24) | ((self.r as u32) << 16) | ((self.g as u32) << 8) | (self.b as u32)
    }
}

/// An open range. The range ends when this value is dropped.
pub struct ProfilerRange {
    name: String,
    start: Instant,
    handle: Option<Box<dyn Any>>,
}

impl ProfilerRange {
    /// A range with no backend handle.
    pub fn stub(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: Instant::now(),
            handle: None,
        }
    }

    /// A range that keeps a backend handle alive until it is dropped.
    pub fn with_handle(name: impl Into<String>, handle: Box<dyn Any>) -> Self {
        Self {
            name: name.into(),
            start: Instant::now(),
            handle: Some(handle),
        }
    }

    /// Range name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a backend handle is attached.
    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    /// Time since the range was opened.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl std::fmt::Debug for ProfilerRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfilerRange")
            .field("name", &self.name)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Something that can bracket phases with named ranges.
pub trait PhaseProfiler: Send + Sync {
    /// Short backend name.
    fn name(&self) -> &'static str;

    /// Open a range; it closes when the returned value drops.
    fn range(&self, name: &str, color: ProfilerColor) -> ProfilerRange;

    /// Insert an instantaneous marker.
    fn mark(&self, _text: &str) {}
}

/// Profiler that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProfiler;

impl PhaseProfiler for NullProfiler {
    fn name(&self) -> &'static str {
        "null"
    }

    fn range(&self, name: &str, _color: ProfilerColor) -> ProfilerRange {
        ProfilerRange::stub(name)
    }
}

/// Profiler that opens a `tracing` span per range and logs its duration.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProfiler;

struct TracingRangeGuard {
    name: String,
    start: Instant,
    _span: tracing::span::EnteredSpan,
}

impl Drop for TracingRangeGuard {
    fn drop(&mut self) {
        debug!(
            range = %self.name,
            elapsed_ms = self.start.elapsed().as_secs_f64() * 1000.0,
            "range end"
        );
    }
}

impl PhaseProfiler for TracingProfiler {
    fn name(&self) -> &'static str {
        "tracing"
    }

    fn range(&self, name: &str, _color: ProfilerColor) -> ProfilerRange {
        let span = info_span!("phase", name = %name).entered();
        debug!(range = %name, "range start");
        let guard = TracingRangeGuard {
            name: name.to_string(),
            start: Instant::now(),
            _span: span,
        };
        ProfilerRange::with_handle(name, Box::new(guard))
    }

    fn mark(&self, text: &str) {
        debug!(marker = %text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_to_argb() {
        assert_eq!(ProfilerColor::new(255, 128, 64).to_argb(), 0xFF_FF_80_40);
        assert_eq!(ProfilerColor::RED.to_argb(), 0xFF_FF_00_00);
        assert_eq!(ProfilerColor::GREEN.to_argb(), 0xFF_00_FF_00);
        assert_eq!(ProfilerColor::BLUE.to_argb(), 0xFF_00_00_FF);
        assert_eq!(ProfilerColor::CYAN.to_argb(), 0xFF_00_FF_FF);
    }

    #[test]
    fn test_null_profiler_range() {
        let profiler = NullProfiler;
        let range = profiler.range("Paged Memory Transfer", ProfilerColor::CYAN);
        assert_eq!(range.name(), "Paged Memory Transfer");
        assert!(!range.is_active());
        profiler.mark("ignored");
    }

    #[test]
    fn test_tracing_profiler_range() {
        let profiler = TracingProfiler;
        let range = profiler.range("Pinned Memory Transfer", ProfilerColor::GREEN);
        assert!(range.is_active());
        assert!(range.elapsed() < Duration::from_secs(60));
        drop(range);
    }

    #[test]
    fn test_profiler_as_trait_object() {
        let profilers: Vec<Box<dyn PhaseProfiler>> = vec![Box::new(NullProfiler), Box::new(TracingProfiler)];
        let names: Vec<_> = profilers.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["null", "tracing"]);
    }
}
