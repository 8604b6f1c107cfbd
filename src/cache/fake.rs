// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Fake cache implementations for unit tests, which record the maintenance requested.

use super::{DataCache, OuterCache};
use std::sync::Mutex;

/// Ranges passed to a fake cache, in call order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CacheOps {
    pub cleaned: Vec<(usize, usize)>,
    pub invalidated: Vec<(usize, usize)>,
}

/// A [`DataCache`] which records every range it is asked to maintain.
#[derive(Debug, Default)]
pub struct FakeCache {
    ops: Mutex<CacheOps>,
}

impl FakeCache {
    pub const fn new() -> Self {
        Self {
            ops: Mutex::new(CacheOps {
                cleaned: Vec::new(),
                invalidated: Vec::new(),
            }),
        }
    }

    /// Returns the recorded operations and clears them.
    pub fn take_ops(&self) -> CacheOps {
        std::mem::take(&mut *self.ops.lock().unwrap())
    }

    /// Returns how many invalidations have been requested so far.
    pub fn invalidate_count(&self) -> usize {
        self.ops.lock().unwrap().invalidated.len()
    }
}

impl DataCache for FakeCache {
    fn clean_range(&self, start: usize, end: usize) {
        self.ops.lock().unwrap().cleaned.push((start, end));
    }

    unsafe fn invalidate_range(&self, start: usize, end: usize) {
        self.ops.lock().unwrap().invalidated.push((start, end));
    }
}

/// An [`OuterCache`] which records every range it is asked to maintain.
#[derive(Debug, Default)]
pub struct FakeOuterCache {
    inner: FakeCache,
}

impl FakeOuterCache {
    pub const fn new() -> Self {
        Self {
            inner: FakeCache::new(),
        }
    }

    /// Returns the recorded operations and clears them.
    pub fn take_ops(&self) -> CacheOps {
        self.inner.take_ops()
    }
}

impl OuterCache for FakeOuterCache {
    fn clean_range(&self, start: usize, end: usize) {
        self.inner.clean_range(start, end);
    }

    unsafe fn invalidate_range(&self, start: usize, end: usize) {
        // SAFETY: The fake only records the range.
        unsafe { self.inner.invalidate_range(start, end) }
    }
}
