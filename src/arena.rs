//! Fixed-capacity atomic arena
//!
//! Mirrors how the GPU kernels hand out PPLL nodes, compacted samples and
//! voxel pages: one atomic reservation per request against a fixed budget.
//! Requests past the budget are refused, never wrapped, and the arena keeps
//! the total number of requests so callers can size the next frame.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Lock-free bump allocator over `0..capacity`
///
/// Refused requests never advance the allocation cursor, so the slots below
/// `allocated_count()` are always densely handed out.
#[derive(Debug)]
pub struct AtomicArena {
    capacity: u32,
    allocated: AtomicU32,
    requested: AtomicU32,
    overflowed: AtomicBool,
}

impl AtomicArena {
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            allocated: AtomicU32::new(0),
            requested: AtomicU32::new(0),
            overflowed: AtomicBool::new(false),
        }
    }

    /// Reserve one slot. Returns `None` once the budget is exhausted.
    pub fn allocate(&self) -> Option<u32> {
        self.allocate_range(1).map(|range| range.start)
    }

    /// Reserve `count` contiguous slots, all or nothing.
    pub fn allocate_range(&self, count: u32) -> Option<std::ops::Range<u32>> {
        if count == 0 {
            return Some(0..0);
        }
        self.requested.fetch_add(count, Ordering::Relaxed);

        let capacity = self.capacity;
        let reserved = self
            .allocated
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |start| {
                start.checked_add(count).filter(|&end| end <= capacity)
            });

        match reserved {
            Ok(start) => Some(start..start + count),
            Err(_) => {
                self.overflowed.store(true, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Slots actually handed out, never above capacity
    pub fn allocated_count(&self) -> u32 {
        self.allocated.load(Ordering::Relaxed)
    }

    /// Every slot requested, including refused ones
    pub fn requested_count(&self) -> u32 {
        self.requested.load(Ordering::Relaxed)
    }

    pub fn overflowed(&self) -> bool {
        self.overflowed.load(Ordering::Relaxed)
    }

    /// Clear for the next frame
    pub fn reset(&self) {
        self.allocated.store(0, Ordering::Relaxed);
        self.requested.store(0, Ordering::Relaxed);
        self.overflowed.store(false, Ordering::Relaxed);
    }
}
