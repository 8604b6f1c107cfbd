// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Fake clock collaborators for unit tests.

use super::{CmdRcgr, Delay, ParentClock, Regmap, RegmapError};
use std::{collections::BTreeMap, sync::Mutex};

#[derive(Debug, Default)]
struct RegmapState {
    registers: BTreeMap<u32, u32>,
    /// Reads of the command register left before hardware clears `UPDATE`, or `None` if it never
    /// does.
    update_latency: Option<usize>,
    pending_reads: Option<usize>,
    command_reads: usize,
    failing: Option<u32>,
}

/// A register map emulating an RCG at `base`.
///
/// Setting `UPDATE` in the command register marks the configuration dirty, and hardware clears both
/// bits again after a configurable number of reads of the command register.
#[derive(Debug)]
pub struct FakeRegmap {
    base: u32,
    state: Mutex<RegmapState>,
}

impl FakeRegmap {
    pub fn new(base: u32) -> Self {
        Self {
            base,
            state: Mutex::new(RegmapState {
                update_latency: Some(0),
                ..Default::default()
            }),
        }
    }

    /// Sets how many reads of the command register see `UPDATE` still set, or `None` for a
    /// configuration that never takes effect.
    pub fn set_update_latency(&self, reads: Option<usize>) {
        self.state.lock().unwrap().update_latency = reads;
    }

    /// Makes every access to the register at `offset` fail.
    pub fn fail_at(&self, offset: u32) {
        self.state.lock().unwrap().failing = Some(offset);
    }

    /// Returns the current value of a register, without emulating a read.
    pub fn peek(&self, offset: u32) -> u32 {
        self.state
            .lock()
            .unwrap()
            .registers
            .get(&offset)
            .copied()
            .unwrap_or_default()
    }

    /// Sets a register directly, without emulating a write.
    pub fn poke(&self, offset: u32, value: u32) {
        self.state.lock().unwrap().registers.insert(offset, value);
    }

    /// Returns the number of reads of the command register so far.
    pub fn command_reads(&self) -> usize {
        self.state.lock().unwrap().command_reads
    }

    fn command(&self) -> u32 {
        self.base + super::CMD_RCGR
    }
}

impl Regmap for FakeRegmap {
    fn read(&self, offset: u32) -> Result<u32, RegmapError> {
        let command = self.command();
        let mut state = self.state.lock().unwrap();
        if state.failing == Some(offset) {
            return Err(RegmapError { offset });
        }
        let value = state.registers.get(&offset).copied().unwrap_or_default();
        if offset != command {
            return Ok(value);
        }

        state.command_reads += 1;
        match state.pending_reads {
            Some(0) => {
                let latched =
                    CmdRcgr::from_bits_retain(value) - CmdRcgr::UPDATE - CmdRcgr::DIRTY_CFG;
                state.registers.insert(offset, latched.bits());
                state.pending_reads = None;
                Ok(latched.bits())
            }
            Some(reads) => {
                state.pending_reads = Some(reads - 1);
                Ok(value)
            }
            None => Ok(value),
        }
    }

    fn update_bits(&self, offset: u32, mask: u32, value: u32) -> Result<(), RegmapError> {
        let command = self.command();
        let mut state = self.state.lock().unwrap();
        if state.failing == Some(offset) {
            return Err(RegmapError { offset });
        }
        let old = state.registers.get(&offset).copied().unwrap_or_default();
        let mut new = (old & !mask) | (value & mask);
        if offset == command && CmdRcgr::from_bits_retain(new).contains(CmdRcgr::UPDATE) {
            new |= CmdRcgr::DIRTY_CFG.bits();
            state.pending_reads = state.update_latency;
        }
        state.registers.insert(offset, new);
        Ok(())
    }
}

/// A [`Delay`] which only counts the time requested.
#[derive(Debug, Default)]
pub struct FakeDelay {
    calls: Mutex<(usize, u64)>,
}

impl FakeDelay {
    /// Returns the number of delays and their total length in microseconds.
    pub fn total(&self) -> (usize, u64) {
        *self.calls.lock().unwrap()
    }
}

impl Delay for FakeDelay {
    fn udelay(&self, us: u32) {
        let mut calls = self.calls.lock().unwrap();
        calls.0 += 1;
        calls.1 += u64::from(us);
    }
}

/// A parent clock which can run at any rate.
#[derive(Debug)]
pub struct ExactParent {
    pub rate: u64,
}

impl ParentClock for ExactParent {
    fn rate(&self) -> u64 {
        self.rate
    }

    fn round_rate(&self, rate: u64) -> u64 {
        rate
    }
}

/// A parent clock which can only run at multiples of `step`, rounding requests up.
#[derive(Debug)]
pub struct SteppedParent {
    pub step: u64,
    pub rate: u64,
}

impl ParentClock for SteppedParent {
    fn rate(&self) -> u64 {
        self.rate
    }

    fn round_rate(&self, rate: u64) -> u64 {
        rate.div_ceil(self.step) * self.step
    }
}

/// A parent clock fixed at a single rate.
#[derive(Debug)]
pub struct FixedParent {
    pub rate: u64,
}

impl ParentClock for FixedParent {
    fn rate(&self) -> u64 {
        self.rate
    }

    fn round_rate(&self, _rate: u64) -> u64 {
        self.rate
    }
}
