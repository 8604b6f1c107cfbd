// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! The trap into the secure monitor.

use super::{FirmwareError, command::CommandBuffer};
#[cfg(all(target_arch = "aarch64", not(test)))]
use core::arch::asm;
use log::warn;

/// `r0` value for a buffered call, which passes the command buffer address in `r2`.
pub const BUFFERED_CALL: u32 = 1;

/// `r0` value for the register class, used on its own to query the SCM version.
pub const REGISTER_CLASS: u32 = 0x1 << 8;

/// Result returned by the secure world when it was interrupted before finishing the call, which
/// must then be made again with the same arguments.
pub const INTERRUPTED: i32 = 1;

/// A way to trap into the secure world.
///
/// Implementations make exactly one trap per method call. Retrying, locking and cache maintenance
/// are left to the caller.
pub trait SecureMonitor: Sync {
    /// Passes the command buffer to the secure world, returning the signed result from `r0`.
    ///
    /// The caller must have cleaned the buffer to memory first.
    fn smc_buffered(&self, command: &mut CommandBuffer) -> i32;

    /// Makes a register class call with `r0` and one argument, returning `r0` and `r1`.
    fn smc_register(&self, r0: u32, arg: u32) -> (i32, u32);
}

/// Translates a virtual address of our memory to the physical address seen by the secure world.
pub type VirtToPhys = fn(usize) -> u64;

/// The real secure monitor, reached with `smc #0`.
///
/// Only the low 32 bits of each argument register are used. On other architectures, and in unit
/// tests, every call fails with [`FirmwareError::NotSupported`] without trapping.
#[derive(Clone, Copy, Debug)]
pub struct SmcMonitor {
    virt_to_phys: VirtToPhys,
    context_id: u32,
}

impl SmcMonitor {
    /// Creates a monitor which uses the given translation for command buffer addresses.
    pub const fn new(virt_to_phys: VirtToPhys) -> Self {
        Self {
            virt_to_phys,
            context_id: 0,
        }
    }

    /// Creates a monitor for an identity mapped address space.
    pub const fn identity() -> Self {
        Self::new(identity_map)
    }

    /// Sets the context identifier passed in `r1`.
    pub const fn with_context_id(self, context_id: u32) -> Self {
        Self { context_id, ..self }
    }
}

fn identity_map(va: usize) -> u64 {
    va as u64
}

impl SecureMonitor for SmcMonitor {
    fn smc_buffered(&self, command: &mut CommandBuffer) -> i32 {
        let phys = (self.virt_to_phys)(command.address());
        let Ok(phys) = u32::try_from(phys) else {
            warn!("SCM command buffer at {phys:#x} is not addressable by the secure world");
            return FirmwareError::InvalidAddress.into();
        };
        smc(BUFFERED_CALL, self.context_id, phys).0
    }

    fn smc_register(&self, r0: u32, arg: u32) -> (i32, u32) {
        smc(r0, self.context_id, arg)
    }
}

#[cfg(all(target_arch = "aarch64", not(test)))]
fn smc(r0: u32, r1: u32, r2: u32) -> (i32, u32) {
    let mut x0 = u64::from(r0);
    let mut x1 = u64::from(r1);
    // SAFETY: The secure world only accesses memory that we have passed to it, i.e. a command
    // buffer which is exclusively borrowed by our caller for the duration of the call.
    unsafe {
        asm!(
            "smc #0",
            inout("x0") x0,
            inout("x1") x1,
            inout("x2") u64::from(r2) => _,
            out("x3") _,
            out("x4") _,
            out("x5") _,
            out("x6") _,
            out("x7") _,
            out("x8") _,
            out("x9") _,
            out("x10") _,
            out("x11") _,
            out("x12") _,
            out("x13") _,
            out("x14") _,
            out("x15") _,
            out("x16") _,
            out("x17") _,
            options(nostack)
        );
    }
    (x0 as u32 as i32, x1 as u32)
}

#[cfg(not(all(target_arch = "aarch64", not(test))))]
fn smc(_r0: u32, _r1: u32, _r2: u32) -> (i32, u32) {
    (FirmwareError::NotSupported.into(), 0)
}
