//! Page-locked host buffers.
//!
//! On unix the buffer is an anonymous private mapping, locked with `mlock`
//! when the process is allowed to. Elsewhere it is a page-aligned heap
//! allocation.

use std::ptr::NonNull;
use std::sync::Arc;

use tracing::debug;

use membench_core::buffer::{Element, HostAllocation, HostBuffer, ELEMENT_SIZE};
use membench_core::error::{BenchError, Result};
use membench_core::tracker::{AllocationToken, AllocationTracker, MemoryKind};

#[cfg(not(unix))]
const PAGE_SIZE: usize = 4096;

/// Zeroed, page-aligned host buffer standing in for driver-pinned memory.
pub struct LockedHostBuffer {
    ptr: NonNull<Element>,
    len: usize,
    locked: bool,
    _token: AllocationToken,
}

impl LockedHostBuffer {
    /// Map `len` zeroed elements and try to lock them if `lock` is set.
    pub fn new(
        len: usize,
        lock: bool,
        tracker: &Arc<AllocationTracker>,
        label: &str,
    ) -> Result<Self> {
        if len == 0 {
            return Err(BenchError::HostAllocationFailed {
                size: 0,
                reason: "cannot allocate zero-length buffer".to_string(),
            });
        }
        let size = len
            .checked_mul(ELEMENT_SIZE)
            .ok_or_else(|| BenchError::HostAllocationFailed {
                size: usize::MAX,
                reason: "size overflow".to_string(),
            })?;

        let (ptr, locked) = map_zeroed(size, lock)?;
        if lock && !locked {
            debug!(label, size, "mlock refused, buffer stays pageable");
        }

        let token = tracker.register(ptr.as_ptr() as u64, size, MemoryKind::Pinned, label);

        Ok(Self {
            ptr,
            len,
            locked,
            _token: token,
        })
    }

    /// Whether the pages are actually locked.
    pub fn is_locked(&self) -> bool {
        self.locked
    }
}

#[cfg(unix)]
fn map_zeroed(size: usize, lock: bool) -> Result<(NonNull<Element>, bool)> {
    // SAFETY: anonymous private mapping, no file descriptor involved.
    let raw = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if raw == libc::MAP_FAILED {
        return Err(BenchError::HostAllocationFailed {
            size,
            reason: std::io::Error::last_os_error().to_string(),
        });
    }

    // SAFETY: `raw` is a live mapping of `size` bytes.
    let locked = lock && unsafe { libc::mlock(raw, size) } == 0;

    let ptr = NonNull::new(raw as *mut Element).ok_or_else(|| BenchError::HostAllocationFailed {
        size,
        reason: "mmap returned null".to_string(),
    })?;
    Ok((ptr, locked))
}

#[cfg(not(unix))]
fn map_zeroed(size: usize, _lock: bool) -> Result<(NonNull<Element>, bool)> {
    let layout = std::alloc::Layout::from_size_align(size, PAGE_SIZE).map_err(|e| {
        BenchError::HostAllocationFailed {
            size,
            reason: e.to_string(),
        }
    })?;
    // SAFETY: layout has non-zero size.
    let raw = unsafe { std::alloc::alloc_zeroed(layout) };
    let ptr = NonNull::new(raw as *mut Element).ok_or_else(|| BenchError::HostAllocationFailed {
        size,
        reason: "out of memory".to_string(),
    })?;
    Ok((ptr, false))
}

impl HostBuffer for LockedHostBuffer {
    fn allocation(&self) -> HostAllocation {
        HostAllocation::Pinned
    }

    fn as_slice(&self) -> &[Element] {
        // SAFETY: ptr covers `len` initialized elements for our lifetime.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    fn as_mut_slice(&mut self) -> &mut [Element] {
        // SAFETY: as above, and `&mut self` guarantees exclusivity.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for LockedHostBuffer {
    fn drop(&mut self) {
        release(self.ptr, self.len * ELEMENT_SIZE, self.locked);
    }
}

#[cfg(unix)]
fn release(ptr: NonNull<Element>, size: usize, locked: bool) {
    let raw = ptr.as_ptr() as *mut libc::c_void;
    // SAFETY: the mapping was created in `map_zeroed` with this size.
    unsafe {
        if locked {
            libc::munlock(raw, size);
        }
        libc::munmap(raw, size);
    }
}

#[cfg(not(unix))]
fn release(ptr: NonNull<Element>, size: usize, _locked: bool) {
    // SAFETY: allocated in `map_zeroed` with this layout.
    unsafe {
        let layout = std::alloc::Layout::from_size_align_unchecked(size, PAGE_SIZE);
        std::alloc::dealloc(ptr.as_ptr() as *mut u8, layout);
    }
}

// SAFETY: the buffer owns its mapping exclusively.
unsafe impl Send for LockedHostBuffer {}

impl std::fmt::Debug for LockedHostBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockedHostBuffer")
            .field("len", &self.len)
            .field("locked", &self.locked)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeroed_and_aligned() {
        let tracker = Arc::new(AllocationTracker::new());
        let buf = LockedHostBuffer::new(1000, true, &tracker, "h_aPinned").unwrap();

        assert_eq!(buf.len(), 1000);
        assert_eq!(buf.allocation(), HostAllocation::Pinned);
        assert!(buf.as_slice().iter().all(|&x| x == 0.0));
        assert_eq!(buf.as_slice().as_ptr() as usize % 4096, 0);
        assert_eq!(tracker.outstanding_of(MemoryKind::Pinned), 1);
    }

    #[test]
    fn test_write_and_release() {
        let tracker = Arc::new(AllocationTracker::new());
        let mut buf = LockedHostBuffer::new(256, false, &tracker, "h_bPinned").unwrap();
        assert!(!buf.is_locked());

        buf.as_mut_slice()[255] = 7.5;
        assert_eq!(buf.as_slice()[255], 7.5);

        drop(buf);
        assert_eq!(tracker.outstanding(), 0);
    }

    #[test]
    fn test_zero_length_rejected() {
        let tracker = Arc::new(AllocationTracker::new());
        assert!(LockedHostBuffer::new(0, true, &tracker, "empty").is_err());
        assert_eq!(tracker.outstanding(), 0);
    }
}
