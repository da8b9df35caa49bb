//! Host buffers under test.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};
use crate::tracker::{AllocationToken, AllocationTracker, MemoryKind};

/// Element type moved by every benchmark.
pub type Element = f32;

/// Size of one element in bytes.
pub const ELEMENT_SIZE: usize = std::mem::size_of::<Element>();

/// How a host buffer was allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostAllocation {
    /// Ordinary swappable allocation.
    Pageable,
    /// Page-locked allocation the device can DMA directly.
    Pinned,
}

impl HostAllocation {
    /// Label used in report headers ("Pageable" / "Pinned").
    pub fn label(&self) -> &'static str {
        match self {
            HostAllocation::Pageable => "Pageable",
            HostAllocation::Pinned => "Pinned",
        }
    }

    /// Corresponding tracker kind.
    pub fn memory_kind(&self) -> MemoryKind {
        match self {
            HostAllocation::Pageable => MemoryKind::Pageable,
            HostAllocation::Pinned => MemoryKind::Pinned,
        }
    }
}

/// A host-resident buffer of [`Element`]s.
///
/// The measurement code only ever sees this trait, so pageable and pinned
/// buffers go through exactly the same copy and timing path.
pub trait HostBuffer {
    /// Allocation strategy of this buffer.
    fn allocation(&self) -> HostAllocation;

    /// Contents as a slice.
    fn as_slice(&self) -> &[Element];

    /// Contents as a mutable slice.
    fn as_mut_slice(&mut self) -> &mut [Element];

    /// Number of elements.
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Whether the buffer holds no elements.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size in bytes.
    fn size_bytes(&self) -> usize {
        self.len() * ELEMENT_SIZE
    }
}

/// Ordinary heap-allocated host buffer.
#[derive(Debug)]
pub struct PageableBuffer {
    data: Vec<Element>,
    _token: AllocationToken,
}

impl PageableBuffer {
    /// Allocate a zeroed pageable buffer of `len` elements.
    pub fn new(len: usize, tracker: &Arc<AllocationTracker>, label: &str) -> Result<Self> {
        if len == 0 {
            return Err(BenchError::HostAllocationFailed {
                size: 0,
                reason: "cannot allocate zero-length buffer".to_string(),
            });
        }

        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|e| BenchError::HostAllocationFailed {
                size: len * ELEMENT_SIZE,
                reason: e.to_string(),
            })?;
        data.resize(len, 0.0);

        let token = tracker.register(
            data.as_ptr() as u64,
            len * ELEMENT_SIZE,
            MemoryKind::Pageable,
            label,
        );

        Ok(Self {
            data,
            _token: token,
        })
    }
}

impl HostBuffer for PageableBuffer {
    fn allocation(&self) -> HostAllocation {
        HostAllocation::Pageable
    }

    fn as_slice(&self) -> &[Element] {
        &self.data
    }

    fn as_mut_slice(&mut self) -> &mut [Element] {
        &mut self.data
    }
}

/// Fill with the deterministic source pattern `buf[i] = i`.
pub fn fill_ramp(buf: &mut [Element]) {
    for (i, x) in buf.iter_mut().enumerate() {
        *x = i as Element;
    }
}

/// Zero a buffer.
pub fn fill_zero(buf: &mut [Element]) {
    buf.fill(0.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_size() {
        assert_eq!(ELEMENT_SIZE, 4);
    }

    #[test]
    fn test_pageable_buffer() {
        let tracker = Arc::new(AllocationTracker::new());
        let mut buf = PageableBuffer::new(1024, &tracker, "h_aPageable").unwrap();

        assert_eq!(buf.allocation(), HostAllocation::Pageable);
        assert_eq!(buf.len(), 1024);
        assert_eq!(buf.size_bytes(), 4096);
        assert!(buf.as_slice().iter().all(|&x| x == 0.0));
        assert_eq!(tracker.outstanding_of(MemoryKind::Pageable), 1);

        fill_ramp(buf.as_mut_slice());
        assert_eq!(buf.as_slice()[0], 0.0);
        assert_eq!(buf.as_slice()[1023], 1023.0);

        drop(buf);
        assert_eq!(tracker.outstanding(), 0);
    }

    #[test]
    fn test_zero_length_rejected() {
        let tracker = Arc::new(AllocationTracker::new());
        let err = PageableBuffer::new(0, &tracker, "empty").unwrap_err();
        assert!(matches!(err, BenchError::HostAllocationFailed { .. }));
        assert_eq!(tracker.outstanding(), 0);
    }

    #[test]
    fn test_fill_zero() {
        let mut data = vec![1.0f32; 8];
        fill_zero(&mut data);
        assert!(data.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_ramp_exact_for_default_size() {
        // Every index below 2^24 is exactly representable in f32
        let mut data = vec![0.0f32; 4 * 1024 * 1024];
        fill_ramp(&mut data);
        assert_eq!(data[4_194_303], 4_194_303.0);
    }

    #[test]
    fn test_allocation_labels() {
        assert_eq!(HostAllocation::Pageable.label(), "Pageable");
        assert_eq!(HostAllocation::Pinned.label(), "Pinned");
        assert_eq!(HostAllocation::Pinned.memory_kind(), MemoryKind::Pinned);
    }
}
