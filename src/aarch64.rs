// Copyright (c) 2025, Google LLC. All rights reserved.
//
// SPDX-License-Identifier: BSD-3-Clause

#[cfg(all(target_arch = "aarch64", not(test)))]
use core::arch::asm;

/// Issues a full-system data synchronization barrier (`dsb sy`).
pub fn dsb_sy() {
    // SAFETY: `dsb` does not violate safe Rust guarantees.
    #[cfg(all(target_arch = "aarch64", not(test)))]
    unsafe {
        asm!("dsb sy", options(nostack));
    }
}

/// Issues an instruction synchronization barrier (`isb`) instruction.
pub fn isb() {
    // SAFETY: `isb` does not violate safe Rust guarantees.
    #[cfg(all(target_arch = "aarch64", not(test)))]
    unsafe {
        asm!("isb", options(nostack));
    }
}

/// Returns the raw value of the cache type register `CTR_EL0`, or `None` when not running on
/// AArch64 (or in unit tests).
pub fn read_ctr_el0() -> Option<u64> {
    #[cfg(all(target_arch = "aarch64", not(test)))]
    {
        let ctr: u64;
        // SAFETY: Reading `CTR_EL0` has no side effects and does not touch memory.
        unsafe {
            asm!(
                "mrs {ctr}, ctr_el0",
                options(nomem, nostack, preserves_flags),
                ctr = out(reg) ctr,
            );
        }
        Some(ctr)
    }
    #[cfg(not(all(target_arch = "aarch64", not(test))))]
    None
}

/// Cleans the data cache line containing `addr` to the point of coherency (`dc cvac`).
pub fn dc_cvac(addr: usize) {
    // SAFETY: Cache maintenance by VA only affects the cache state of an address the caller owns,
    // it does not change the contents of memory as observed by this CPU.
    #[cfg(all(target_arch = "aarch64", not(test)))]
    unsafe {
        asm!("dc cvac, {addr}", options(nostack), addr = in(reg) addr);
    }
    #[cfg(not(all(target_arch = "aarch64", not(test))))]
    let _ = addr;
}

/// Invalidates the data cache line containing `addr` to the point of coherency (`dc ivac`).
///
/// # Safety
///
/// Any dirty data in the line is discarded. The caller must ensure that nothing else has written
/// to the line through the cache since it was last cleaned.
pub unsafe fn dc_ivac(addr: usize) {
    // SAFETY: Our caller guarantees that the line holds no dirty data which must be kept.
    #[cfg(all(target_arch = "aarch64", not(test)))]
    unsafe {
        asm!("dc ivac, {addr}", options(nostack), addr = in(reg) addr);
    }
    #[cfg(not(all(target_arch = "aarch64", not(test))))]
    let _ = addr;
}
