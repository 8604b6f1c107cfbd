// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Client for the Qualcomm Secure Channel Manager.
//!
//! Requests are framed in a [`CommandBuffer`] shared with the secure world and passed to it with an
//! `smc` trap. The secure world processes the command, writes its response into the same buffer and
//! sets the response's `is_complete` flag, which we poll.
//!
//! Only one buffered call may be in flight at a time, so [`Scm`] serializes them. Atomic calls pass
//! their arguments in registers and need no lock.

mod boot;
pub mod command;
#[cfg(test)]
pub(crate) mod fake;
mod hdcp;
mod info;
mod iommu;
mod monitor;
mod pas;
mod video;

pub use boot::{COLD_BOOT_FLAGS, CpuMask, WARM_BOOT_FLAGS};
pub use command::CommandBuffer;
pub use hdcp::{HDCP_MAX_REQUESTS, HdcpRequest};
pub use iommu::{IommuMapInfo, IommuPageList};
pub use monitor::{
    BUFFERED_CALL, INTERRUPTED, REGISTER_CLASS, SecureMonitor, SmcMonitor, VirtToPhys,
};

use crate::cache::{ArmDataCache, DataCache};
use core::{
    fmt::{self, Debug, Formatter},
    hint::spin_loop,
    mem,
};
use log::{debug, error, trace};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use spin::{Once, mutex::SpinMutex};
use thiserror::Error;
use zerocopy::{FromBytes, Immutable, IntoBytes};

const SVC_BOOT: u32 = 0x1;
const SVC_PIL: u32 = 0x2;
const SVC_UTIL: u32 = 0x3;
const SVC_INFO: u32 = 0x6;
const SVC_MP: u32 = 0xc;
const SVC_HDCP: u32 = 0x11;

/// An error making an SCM call.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum Error {
    /// The command buffer couldn't be allocated.
    #[error("Out of memory for SCM command buffer")]
    OutOfMemory,
    /// An argument was out of range, or the secure world rejected the request.
    #[error("Invalid argument")]
    InvalidArgument,
    /// The secure world didn't mark the command complete within the configured poll limit.
    #[error("Timed out waiting for SCM command to complete")]
    Timeout,
    /// The secure world placed the response payload outside the command buffer.
    #[error("SCM response payload outside command buffer")]
    MalformedResponse,
    /// The trap returned one of the documented error codes.
    #[error("Secure world returned {0:?}")]
    Firmware(FirmwareError),
    /// The command reported a non-zero status, either as a positive trap result or in its
    /// response.
    #[error("SCM command failed with status {0:#x}")]
    Status(u32),
}

impl Error {
    /// Translates a negative result from the trap.
    ///
    /// Codes outside the documented set are treated as [`Error::InvalidArgument`].
    pub fn from_firmware(code: i32) -> Self {
        match FirmwareError::try_from(code) {
            Ok(error) => Self::Firmware(error),
            Err(_) => Self::InvalidArgument,
        }
    }

    /// Returns `Ok(())` for a zero response status, or [`Error::Status`] otherwise.
    pub fn check_status(status: u32) -> Result<(), Self> {
        if status == 0 {
            Ok(())
        } else {
            Err(Self::Status(status))
        }
    }
}

/// Error codes returned by the secure world in `r0`.
#[derive(Clone, Copy, Debug, Eq, IntoPrimitive, PartialEq, TryFromPrimitive)]
#[repr(i32)]
pub enum FirmwareError {
    /// Unspecified failure.
    Generic = -1,
    /// An argument was invalid.
    InvalidArgument = -2,
    /// An address was invalid or not accessible to the secure world.
    InvalidAddress = -3,
    /// The service or command is not supported.
    NotSupported = -4,
    /// The secure world ran out of memory.
    NoMemory = -5,
}

/// Identifies a command of a secure world service.
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct CallId {
    /// The service number.
    pub service: u32,
    /// The command number within the service.
    pub command: u32,
}

impl CallId {
    /// Creates a new call identifier.
    pub const fn new(service: u32, command: u32) -> Self {
        Self { service, command }
    }

    /// Returns the identifier written to the command header of a buffered call.
    pub const fn buffered(self) -> u32 {
        (self.service << 10) | self.command
    }

    /// Returns the value passed in `r0` for an atomic call with `argc` register arguments.
    ///
    /// This marks the call as register class with interrupts masked.
    pub const fn atomic(self, argc: u32) -> u32 {
        ((((self.service << 10) | (self.command & 0x3ff)) << 12) | (0x2 << 8) | (1 << 5))
            | (argc & 0xf)
    }
}

impl Debug for CallId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{:#x}:{:#x}", self.service, self.command)
    }
}

/// Run-time configuration of an [`Scm`] instance.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ScmConfig {
    /// Maximum number of times to check the completion flag of a buffered call.
    ///
    /// `None` polls until the secure world completes the command. When the limit is hit the call
    /// fails with [`Error::Timeout`] and the command buffer is leaked, as the secure world may
    /// still write to it. The flag is always checked at least once, so `Some(0)` behaves like
    /// `Some(1)`.
    pub completion_poll_limit: Option<usize>,
}

/// The SCM service: the transport lock, cached version and warm boot registry, together with the
/// monitor and cache maintenance used to reach the secure world.
pub struct Scm<M, C> {
    monitor: M,
    cache: C,
    config: ScmConfig,
    /// Serializes buffered calls and the version query.
    lock: SpinMutex<()>,
    version: Once<u32>,
    warm_boot: SpinMutex<[Option<u64>; WARM_BOOT_FLAGS.len()]>,
}

impl<M: SecureMonitor, C: DataCache> Scm<M, C> {
    /// Creates a new SCM service.
    pub const fn new(monitor: M, cache: C, config: ScmConfig) -> Self {
        Self {
            monitor,
            cache,
            config,
            lock: SpinMutex::new(()),
            version: Once::new(),
            warm_boot: SpinMutex::new([None; WARM_BOOT_FLAGS.len()]),
        }
    }

    /// Returns the secure monitor used for traps.
    pub fn monitor(&self) -> &M {
        &self.monitor
    }

    /// Makes a buffered call, sending `request` and filling `response` with the response payload.
    ///
    /// Either may be empty. Returns an error without reading the response if the trap fails.
    pub fn call(&self, id: CallId, request: &[u8], response: &mut [u8]) -> Result<(), Error> {
        let mut buffer = CommandBuffer::new(request.len(), response.len())?;
        buffer.set_id(id.buffered());
        buffer.command_payload_mut().copy_from_slice(request);

        trace!("SCM call {id:?} with {} byte request", request.len());
        {
            let _guard = self.lock.lock();
            self.trap_buffered(&mut buffer).inspect_err(|e| {
                debug!("SCM call {id:?} failed: {e}");
            })?;
        }

        let header = buffer.response_header_range();
        let mut polls = 0;
        loop {
            // SAFETY: The header lies within our page-aligned allocation, so every rounded line is
            // ours, and we haven't written to it since it was cleaned before the trap.
            unsafe {
                self.cache.invalidate_range(header.start, header.end);
            }
            if buffer.is_complete() {
                break;
            }
            polls += 1;
            if self
                .config
                .completion_poll_limit
                .is_some_and(|limit| polls >= limit)
            {
                error!("SCM call {id:?} not complete after {polls} polls");
                // The secure world may still write to the buffer, so it must never be reused.
                mem::forget(buffer);
                return Err(Error::Timeout);
            }
            spin_loop();
        }

        let payload_end = buffer.address() + buffer.response_payload_offset()? + response.len();
        // SAFETY: The response payload offset has been checked to lie within our allocation, and
        // nothing has written to the response since the buffer was cleaned.
        unsafe {
            self.cache.invalidate_range(header.start, payload_end);
        }
        response.copy_from_slice(buffer.response_payload()?);
        Ok(())
    }

    /// Makes a buffered call with a fixed-layout request and response.
    pub fn call_typed<Req, Resp>(&self, id: CallId, request: &Req) -> Result<Resp, Error>
    where
        Req: IntoBytes + Immutable,
        Resp: FromBytes + IntoBytes,
    {
        let mut response = Resp::new_zeroed();
        self.call(id, request.as_bytes(), response.as_mut_bytes())?;
        Ok(response)
    }

    /// Makes an atomic call with a single register argument, returning the non-negative result.
    ///
    /// Atomic calls are not serialized with each other or with buffered calls, so this must only be
    /// used for commands which the secure world documents as SMP safe.
    pub fn call_atomic1(&self, id: CallId, arg: u32) -> Result<u32, Error> {
        trace!("SCM atomic call {id:?}({arg:#x})");
        let (ret, _) = self.monitor.smc_register(id.atomic(1), arg);
        if ret < 0 {
            Err(Error::from_firmware(ret))
        } else {
            Ok(ret as u32)
        }
    }

    /// Cleans the buffer to memory then traps, repeating the trap for as long as the secure world
    /// reports that it was interrupted.
    ///
    /// Any other non-zero result ends the call, so the response is never polled for.
    ///
    /// Must be called with `lock` held.
    fn trap_buffered(&self, buffer: &mut CommandBuffer) -> Result<(), Error> {
        let start = buffer.address();
        self.cache.clean_range(start, start + buffer.len());
        loop {
            let ret = self.monitor.smc_buffered(buffer);
            if ret == INTERRUPTED {
                continue;
            }
            return match ret {
                0 => Ok(()),
                ret if ret < 0 => Err(Error::from_firmware(ret)),
                ret => Err(Error::Status(ret.unsigned_abs())),
            };
        }
    }
}

/// The process-wide SCM service backed by the real secure monitor.
pub type HardwareScm = Scm<SmcMonitor, ArmDataCache>;

static SCM: Once<HardwareScm> = Once::new();

/// Initialises the process-wide SCM service.
///
/// Only the first call has any effect; later calls return the existing instance and drop their
/// arguments.
pub fn init(monitor: SmcMonitor, cache: ArmDataCache, config: ScmConfig) -> &'static HardwareScm {
    SCM.call_once(|| Scm::new(monitor, cache, config))
}

/// Returns the process-wide SCM service, if [`init`] has been called.
pub fn get() -> Option<&'static HardwareScm> {
    SCM.get()
}
