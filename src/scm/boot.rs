// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Boot service: CPU entry points and power down.

use super::{CallId, Error, SVC_BOOT, Scm, SecureMonitor};
use crate::cache::DataCache;
use core::fmt::{self, Debug, Formatter};
use log::{debug, warn};
use zerocopy::{Immutable, IntoBytes, KnownLayout, byteorder::little_endian::U32};

const BOOT_ADDR: CallId = CallId::new(SVC_BOOT, 0x1);
const TERMINATE_PC: CallId = CallId::new(SVC_BOOT, 0x2);

/// Flags selecting which CPUs a cold boot entry point applies to, indexed by CPU number.
pub const COLD_BOOT_FLAGS: [u32; 4] = [0x00, 0x01, 0x08, 0x20];

/// Flags selecting which CPUs a warm boot entry point applies to, indexed by CPU number.
pub const WARM_BOOT_FLAGS: [u32; 4] = [0x04, 0x02, 0x10, 0x40];

/// Mask of the power down flags that the secure world accepts.
const FLUSH_FLAG_MASK: u32 = 0x3;

/// A set of CPU numbers, one bit per CPU.
#[derive(Clone, Copy, Default, Eq, PartialEq)]
pub struct CpuMask(pub u64);

impl CpuMask {
    /// The empty set.
    pub const EMPTY: Self = Self(0);

    /// Returns a mask containing the given CPUs. CPUs from 64 up can't be represented and are left
    /// out.
    pub fn from_cpus(cpus: &[usize]) -> Self {
        cpus.iter().fold(Self::EMPTY, |mask, &cpu| mask.with(cpu))
    }

    /// Returns a copy of the mask with `cpu` added, or unchanged if `cpu` is 64 or more.
    pub const fn with(self, cpu: usize) -> Self {
        if cpu < u64::BITS as usize {
            Self(self.0 | 1 << cpu)
        } else {
            self
        }
    }

    /// Returns whether `cpu` is in the mask.
    pub const fn contains(self, cpu: usize) -> bool {
        cpu < u64::BITS as usize && self.0 & (1 << cpu) != 0
    }

    /// Returns whether the mask is empty.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterates over the CPUs in the mask, in ascending order.
    pub fn iter(self) -> impl Iterator<Item = usize> {
        (0..u64::BITS as usize).filter(move |&cpu| self.contains(cpu))
    }
}

impl Debug for CpuMask {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[derive(Clone, Debug, Eq, IntoBytes, Immutable, KnownLayout, PartialEq)]
#[repr(C)]
struct BootAddrRequest {
    flags: U32,
    addr: U32,
}

impl<M: SecureMonitor, C: DataCache> Scm<M, C> {
    /// Sets the entry point for CPUs coming out of reset.
    ///
    /// Only CPUs 0 to 3 can be configured. Any others in `cpus` are left out of the request and
    /// returned, so the caller can stop treating them as present.
    pub fn set_cold_boot_addr(&self, entry: u64, cpus: CpuMask) -> Result<CpuMask, Error> {
        if cpus.is_empty() {
            return Err(Error::InvalidArgument);
        }

        let mut flags = 0;
        let mut dropped = CpuMask::EMPTY;
        for cpu in cpus.iter() {
            match COLD_BOOT_FLAGS.get(cpu) {
                Some(flag) => flags |= flag,
                None => dropped = dropped.with(cpu),
            }
        }
        if !dropped.is_empty() {
            warn!("No cold boot entry point for CPUs {dropped:?}");
        }

        self.set_boot_addr(entry, flags)?;
        Ok(dropped)
    }

    /// Sets the entry point for CPUs resuming from a power down.
    ///
    /// The secure world is only asked to change CPUs whose warm boot entry point differs from
    /// `entry`, so repeating a call is cheap. Fails with [`Error::InvalidArgument`] if `cpus`
    /// includes a CPU above 3.
    pub fn set_warm_boot_addr(&self, entry: u64, cpus: CpuMask) -> Result<(), Error> {
        if cpus.iter().any(|cpu| cpu >= WARM_BOOT_FLAGS.len()) {
            return Err(Error::InvalidArgument);
        }

        let mut registry = self.warm_boot.lock();
        let flags = cpus
            .iter()
            .filter(|&cpu| registry[cpu] != Some(entry))
            .fold(0, |flags, cpu| flags | WARM_BOOT_FLAGS[cpu]);
        if flags == 0 {
            debug!("Warm boot entry point for CPUs {cpus:?} already {entry:#x}");
            return Ok(());
        }

        self.set_boot_addr(entry, flags)?;
        for cpu in cpus.iter() {
            registry[cpu] = Some(entry);
        }
        Ok(())
    }

    /// Returns the warm boot entry point last set for the given CPU.
    pub fn warm_boot_addr(&self, cpu: usize) -> Option<u64> {
        self.warm_boot.lock().get(cpu).copied().flatten()
    }

    /// Powers down the calling CPU, with `flags` selecting how much cache state is flushed first.
    ///
    /// Only returns if the secure world doesn't power the CPU down.
    pub fn cpu_power_down(&self, flags: u32) -> Result<(), Error> {
        self.call_atomic1(TERMINATE_PC, flags & FLUSH_FLAG_MASK)?;
        Ok(())
    }

    fn set_boot_addr(&self, entry: u64, flags: u32) -> Result<(), Error> {
        let addr = u32::try_from(entry).map_err(|_| Error::InvalidArgument)?;
        let request = BootAddrRequest {
            flags: flags.into(),
            addr: addr.into(),
        };
        self.call(BOOT_ADDR, request.as_bytes(), &mut [])
    }
}
