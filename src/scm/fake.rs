// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! A simulated secure world for unit tests.

use super::{
    INTERRUPTED, SecureMonitor,
    command::{CommandBuffer, RESPONSE_HEADER_SIZE},
};
use crate::cache::{
    DataCache,
    fake::{CacheOps, FakeCache},
};
use std::sync::{
    Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

type BufferedHandler = dyn Fn(u32, &[u8], &mut [u8]) -> i32 + Send + Sync;
type RegisterHandler = dyn Fn(u32, u32) -> (i32, u32) + Send + Sync;

/// A [`SecureMonitor`] which hands each trap to a closure.
///
/// Buffered calls pass the command id, request payload and response payload to the closure, then
/// mark the command complete unless the closure returned [`INTERRUPTED`] or an error, or completion
/// has been deferred.
pub struct FakeMonitor {
    buffered: Box<BufferedHandler>,
    register: Box<RegisterHandler>,
    defer_completion: AtomicBool,
    response_offset: Mutex<Option<u32>>,
    buffered_count: AtomicUsize,
    last_buffer: Mutex<Option<Vec<u8>>>,
    register_calls: Mutex<Vec<(u32, u32)>>,
}

impl FakeMonitor {
    fn new(buffered: Box<BufferedHandler>, register: Box<RegisterHandler>) -> Self {
        Self {
            buffered,
            register,
            defer_completion: AtomicBool::new(false),
            response_offset: Mutex::new(None),
            buffered_count: AtomicUsize::new(0),
            last_buffer: Mutex::new(None),
            register_calls: Mutex::new(Vec::new()),
        }
    }

    /// Creates a fake which handles buffered calls with `handler` and rejects register calls.
    pub fn with_buffered(
        handler: impl Fn(u32, &[u8], &mut [u8]) -> i32 + Send + Sync + 'static,
    ) -> Self {
        Self::new(Box::new(handler), Box::new(|_: u32, _: u32| (-4, 0)))
    }

    /// Creates a fake which handles register calls with `handler` and rejects buffered calls.
    pub fn with_register(handler: impl Fn(u32, u32) -> (i32, u32) + Send + Sync + 'static) -> Self {
        Self::new(Box::new(|_: u32, _: &[u8], _: &mut [u8]| -4), Box::new(handler))
    }

    /// Leaves buffered calls incomplete, for a [`LaggingCache`] to complete later.
    pub fn defer_completion(&self) {
        self.defer_completion.store(true, Ordering::SeqCst);
    }

    /// Moves the response payload of every buffered call to the given offset.
    pub fn set_response_offset(&self, offset: u32) {
        *self.response_offset.lock().unwrap() = Some(offset);
    }

    /// Returns the number of buffered traps made.
    pub fn buffered_count(&self) -> usize {
        self.buffered_count.load(Ordering::SeqCst)
    }

    /// Returns the used part of the last command buffer, as it was when trapped.
    pub fn last_buffer(&self) -> Option<Vec<u8>> {
        self.last_buffer.lock().unwrap().clone()
    }

    /// Returns the `(r0, arg)` of every register call made.
    pub fn register_calls(&self) -> Vec<(u32, u32)> {
        self.register_calls.lock().unwrap().clone()
    }
}

impl SecureMonitor for FakeMonitor {
    fn smc_buffered(&self, command: &mut CommandBuffer) -> i32 {
        self.buffered_count.fetch_add(1, Ordering::SeqCst);
        *self.last_buffer.lock().unwrap() = Some(command.as_bytes()[..command.len()].to_vec());

        let id = command.command_header().id.get();
        let request = command.command_payload().to_vec();
        let ret = (self.buffered)(id, &request, command.response_payload_mut().unwrap());
        if ret == INTERRUPTED || ret < 0 {
            return ret;
        }

        if let Some(offset) = *self.response_offset.lock().unwrap() {
            command.set_response_offset(offset);
        }
        if !self.defer_completion.load(Ordering::SeqCst) {
            command.mark_complete();
        }
        ret
    }

    fn smc_register(&self, r0: u32, arg: u32) -> (i32, u32) {
        self.register_calls.lock().unwrap().push((r0, arg));
        (self.register)(r0, arg)
    }
}

/// A [`DataCache`] over which the secure world's completion of a command only becomes visible
/// after a number of invalidations of the response header.
pub struct LaggingCache {
    inner: FakeCache,
    remaining: AtomicUsize,
}

impl LaggingCache {
    /// Creates a cache which hides completion for the first `polls` header invalidations.
    pub fn new(polls: usize) -> Self {
        Self {
            inner: FakeCache::new(),
            remaining: AtomicUsize::new(polls),
        }
    }

    /// Returns the recorded operations and clears them.
    pub fn take_ops(&self) -> CacheOps {
        self.inner.take_ops()
    }

    /// Returns how many invalidations have been requested so far.
    pub fn invalidate_count(&self) -> usize {
        self.inner.invalidate_count()
    }
}

impl DataCache for LaggingCache {
    fn clean_range(&self, start: usize, end: usize) {
        self.inner.clean_range(start, end);
    }

    unsafe fn invalidate_range(&self, start: usize, end: usize) {
        // SAFETY: The fake only records the range.
        unsafe { self.inner.invalidate_range(start, end) };
        if end - start != RESPONSE_HEADER_SIZE {
            return;
        }
        let hidden = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !hidden {
            // SAFETY: `start` is the response header of a live command buffer, and `is_complete` is
            // its last field. Nothing holds a reference into the buffer during cache maintenance.
            unsafe {
                ((start + 8) as *mut [u8; 4]).write_volatile(1u32.to_le_bytes());
            }
        }
    }
}
