// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Data cache maintenance for memory shared with the secure world.
//!
//! The SCM command buffer is ordinary cacheable kernel memory rather than a coherent DMA mapping,
//! so it has to be cleaned before the secure world reads it and invalidated before we read what
//! the secure world wrote.

#[cfg(test)]
pub(crate) mod fake;

use crate::aarch64::{dc_cvac, dc_ivac, dsb_sy, isb, read_ctr_el0};

/// Line size to assume when the cache type register can't be read, e.g. in host builds.
const DEFAULT_LINE_SIZE: usize = 64;

const CTR_DMINLINE_SHIFT: u64 = 16;
const CTR_DMINLINE_MASK: u64 = 0xf;

/// Cache maintenance by virtual address range.
///
/// Ranges are half-open, `[start, end)`. Implementations round them outwards to whole cache lines.
pub trait DataCache: Sync {
    /// Writes back any dirty lines in the range so that another observer sees our writes.
    fn clean_range(&self, start: usize, end: usize);

    /// Discards the cached copy of the range so that subsequent reads come from memory.
    ///
    /// # Safety
    ///
    /// Lines are invalidated whole, so the caller must own every line touched by the rounded range
    /// and must not have unwritten data in any of them that it still needs.
    unsafe fn invalidate_range(&self, start: usize, end: usize);
}

/// An outer (system level) cache such as an L2 controller which needs explicit maintenance in
/// addition to the CPU caches.
pub trait OuterCache: Sync {
    /// Writes back any dirty lines in the range.
    fn clean_range(&self, start: usize, end: usize);

    /// Discards the cached copy of the range.
    ///
    /// # Safety
    ///
    /// Same requirements as [`DataCache::invalidate_range`].
    unsafe fn invalidate_range(&self, start: usize, end: usize);
}

/// Returns `[start, end)` widened to whole lines of `line_size` bytes.
///
/// `line_size` must be a power of two.
pub fn line_span(start: usize, end: usize, line_size: usize) -> (usize, usize) {
    debug_assert!(line_size.is_power_of_two());
    let mask = line_size - 1;
    (start & !mask, end.saturating_add(mask) & !mask)
}

/// Returns the smallest data cache line size of the CPU, in bytes.
pub fn dcache_line_size() -> usize {
    match read_ctr_el0() {
        Some(ctr) => 4 << ((ctr >> CTR_DMINLINE_SHIFT) & CTR_DMINLINE_MASK),
        None => DEFAULT_LINE_SIZE,
    }
}

/// Cache maintenance using the Arm `dc` instructions, optionally followed through to an outer
/// cache.
pub struct ArmDataCache {
    line_size: usize,
    outer: Option<&'static dyn OuterCache>,
}

impl ArmDataCache {
    /// Creates a new instance for the current CPU, without an outer cache.
    pub fn new() -> Self {
        Self {
            line_size: dcache_line_size(),
            outer: None,
        }
    }

    /// Creates a new instance which also maintains the given outer cache.
    pub fn with_outer(outer: &'static dyn OuterCache) -> Self {
        Self {
            line_size: dcache_line_size(),
            outer: Some(outer),
        }
    }

    /// Returns the line size used to round ranges.
    pub fn line_size(&self) -> usize {
        self.line_size
    }
}

impl Default for ArmDataCache {
    fn default() -> Self {
        Self::new()
    }
}

impl DataCache for ArmDataCache {
    fn clean_range(&self, start: usize, end: usize) {
        let (start, end) = line_span(start, end, self.line_size);
        for line in (start..end).step_by(self.line_size) {
            dc_cvac(line);
        }
        dsb_sy();
        if let Some(outer) = self.outer {
            outer.clean_range(start, end);
        }
    }

    unsafe fn invalidate_range(&self, start: usize, end: usize) {
        let (start, end) = line_span(start, end, self.line_size);
        // The outer cache goes first, otherwise a line could be refetched into the inner cache from
        // a stale outer copy.
        if let Some(outer) = self.outer {
            // SAFETY: Our caller upholds the same contract for the whole rounded range.
            unsafe {
                outer.invalidate_range(start, end);
            }
        }
        for line in (start..end).step_by(self.line_size) {
            // SAFETY: Our caller owns every line in the rounded range and has nothing dirty in it.
            unsafe {
                dc_ivac(line);
            }
        }
        dsb_sy();
        isb();
    }
}
