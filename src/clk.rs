// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Clock controller support: the collaborators a clock needs from its surroundings, and the RCG
//! register definitions shared by clock types.

#[cfg(test)]
pub(crate) mod fake;
pub mod mux_div;

use bitflags::bitflags;
use thiserror::Error;

/// Offset of the RCG command register from the start of the RCG.
pub const CMD_RCGR: u32 = 0x0;

/// Offset of the RCG configuration register from the start of the RCG.
pub const CFG_RCGR: u32 = 0x4;

bitflags! {
    /// Fields of the RCG command register.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct CmdRcgr: u32 {
        /// Set by software to latch the configuration register, cleared by hardware once the new
        /// configuration is in effect.
        const UPDATE = 1 << 0;
        /// The configuration register has been written but not yet latched.
        const DIRTY_CFG = 1 << 4;
        /// The root clock is off.
        const ROOT_OFF = 1 << 31;
    }
}

/// A failed register access.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
#[error("Register access at offset {offset:#x} failed")]
pub struct RegmapError {
    /// Offset of the register within the register map.
    pub offset: u32,
}

/// An error operating a clock.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum Error {
    /// The hardware didn't accept a new configuration in time.
    #[error("Clock busy")]
    Busy,
    /// The requested rate or parent can't be provided.
    #[error("Invalid argument")]
    InvalidArgument,
    /// A register couldn't be accessed.
    #[error(transparent)]
    Regmap(#[from] RegmapError),
}

/// Access to a block of 32-bit registers.
pub trait Regmap {
    /// Reads the register at the given offset.
    fn read(&self, offset: u32) -> Result<u32, RegmapError>;

    /// Replaces the bits of the register at `offset` selected by `mask` with those of `value`.
    fn update_bits(&self, offset: u32, mask: u32, value: u32) -> Result<(), RegmapError>;
}

/// A clock which can feed a mux.
pub trait ParentClock: Sync {
    /// Returns the current rate of the clock, in Hz.
    fn rate(&self) -> u64;

    /// Returns the rate the clock would actually run at if asked for `rate`.
    fn round_rate(&self, rate: u64) -> u64;
}

/// A busy-wait delay.
pub trait Delay {
    /// Waits for at least the given number of microseconds.
    fn udelay(&self, us: u32);
}

/// Returns a mask of the low `width` bits.
pub const fn field_mask(width: u32) -> u32 {
    if width >= u32::BITS {
        u32::MAX
    } else {
        (1 << width) - 1
    }
}

/// Computes `x * numerator / denominator` without overflowing the intermediate product for large
/// `x`.
pub const fn mult_frac(x: u64, numerator: u64, denominator: u64) -> u64 {
    let quotient = x / denominator;
    let remainder = x % denominator;
    quotient * numerator + remainder * numerator / denominator
}

/// Divides `dividend` by `divisor`, rounding to the nearest integer.
pub const fn div_round_closest(dividend: u64, divisor: u64) -> u64 {
    (dividend + divisor / 2) / divisor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks() {
        assert_eq!(field_mask(0), 0);
        assert_eq!(field_mask(5), 0x1f);
        assert_eq!(field_mask(32), u32::MAX);
    }

    #[test]
    fn mult_frac_keeps_precision() {
        assert_eq!(mult_frac(19_200_000, 1, 2), 9_600_000);
        assert_eq!(mult_frac(7, 3, 2), 10);
        assert_eq!(mult_frac(u64::MAX, 2, 2), u64::MAX);
    }

    #[test]
    fn round_closest() {
        assert_eq!(div_round_closest(800_000_000, 300_000_000), 3);
        assert_eq!(div_round_closest(800_000_000, 320_000_000), 3);
        assert_eq!(div_round_closest(800_000_000, 340_000_000), 2);
    }

    #[test]
    fn command_register_bits() {
        let value = CmdRcgr::from_bits_retain(0x8000_0011);
        assert!(value.contains(CmdRcgr::UPDATE | CmdRcgr::DIRTY_CFG | CmdRcgr::ROOT_OFF));
        assert_eq!(CmdRcgr::DIRTY_CFG.bits(), 0x10);
    }
}
