// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! An RCG which combines a source mux with a half-integer divider.
//!
//! The divider field holds `N` for a divide ratio of `(N + 1) / 2`, so the output rate is
//! `parent_rate * 2 / (N + 1)`. A new source and divider are written to the configuration register
//! and then latched together by setting `UPDATE` in the command register.

use super::{
    CFG_RCGR, CMD_RCGR, CmdRcgr, Delay, Error, ParentClock, Regmap, div_round_closest, field_mask,
    mult_frac,
};
use log::{debug, error};
use spin::mutex::SpinMutex;

/// Number of times the command register is polled for the hardware to accept an update, 1µs apart.
const UPDATE_POLLS: u32 = 500;

/// Static description of a mux/divider instance.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MuxDivConfig {
    /// Name used in log messages.
    pub name: &'static str,
    /// Offset of the RCG's command register within the register map.
    pub reg_offset: u32,
    /// Width of the divider field, in bits.
    pub hid_width: u32,
    /// Position of the divider field in the configuration register.
    pub hid_shift: u32,
    /// Width of the source select field, in bits.
    pub src_width: u32,
    /// Position of the source select field in the configuration register.
    pub src_shift: u32,
    /// Source select value to park the clock on while it is disabled.
    pub safe_src: Option<u32>,
    /// Rate to run at from the safe source while the clock is disabled, in Hz.
    pub safe_freq: Option<u64>,
    /// Source select and divider the clock starts with.
    pub initial: SrcDiv,
}

/// A source select and divider field value pair.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SrcDiv {
    /// Source select field value.
    pub src_sel: u32,
    /// Divider field value, i.e. twice the divide ratio minus one.
    pub div: u32,
}

/// One input of the mux.
#[derive(Clone, Copy)]
pub struct Parent<'a> {
    /// The parent clock.
    pub clock: &'a dyn ParentClock,
    /// Source select field value which routes this parent to the output.
    pub cfg: u32,
}

/// The outcome of a rate search.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RateRequest {
    /// The rate the clock will actually run at, in Hz.
    pub rate: u64,
    /// The rate the chosen parent must run at, in Hz.
    pub best_parent_rate: u64,
    /// Index of the chosen parent.
    pub best_parent: usize,
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
    request: RateRequest,
    /// Divide ratio times two.
    div: u32,
}

/// A mux/divider RCG.
pub struct MuxDiv<'a, R, D> {
    config: MuxDivConfig,
    regmap: R,
    delay: D,
    parents: &'a [Parent<'a>],
    /// The last configuration successfully programmed, restored by `enable`.
    current: SpinMutex<SrcDiv>,
}

/// Returns whether `new` is a better match for `requested` than `best`: the lowest rate not below
/// the request, or failing that the highest rate.
fn is_better_rate(requested: u64, best: u64, new: u64) -> bool {
    (requested <= new && new < best) || (best < requested && best < new)
}

/// Returns the lowest parent rate which gives at least `rate` when divided by `div / 2`.
fn parent_rate_for(rate: u64, div: u32) -> u64 {
    let div = u64::from(div);
    (rate / 2)
        .saturating_mul(div)
        .saturating_add((rate % 2 * div).div_ceil(2))
}

/// Places `value` in the field of the given width and position, dropping bits that don't fit.
fn insert_field(value: u32, width: u32, shift: u32) -> u32 {
    (value & field_mask(width)).checked_shl(shift).unwrap_or(0)
}

/// Extracts the field of the given width and position from a register value.
fn extract_field(register: u32, width: u32, shift: u32) -> u32 {
    register.checked_shr(shift).unwrap_or(0) & field_mask(width)
}

impl<'a, R: Regmap, D: Delay> MuxDiv<'a, R, D> {
    /// Creates a new mux/divider with the given parents, in index order.
    pub fn new(config: MuxDivConfig, regmap: R, delay: D, parents: &'a [Parent<'a>]) -> Self {
        Self {
            current: SpinMutex::new(config.initial),
            config,
            regmap,
            delay,
            parents,
        }
    }

    /// Returns the register map.
    pub fn regmap(&self) -> &R {
        &self.regmap
    }

    /// Returns the configuration last programmed successfully.
    pub fn current(&self) -> SrcDiv {
        *self.current.lock()
    }

    /// Finds the parent and parent rate which get closest to `rate`, preferring rates at or above
    /// it.
    pub fn determine_rate(&self, rate: u64) -> Result<RateRequest, Error> {
        self.find_best(rate)
            .map(|candidate| candidate.request)
            .ok_or(Error::InvalidArgument)
    }

    /// Switches to the source and divider which get closest to `rate`.
    ///
    /// The parent is chosen by the same search as [`Self::determine_rate`], so it should already
    /// have been set to the parent rate that returned.
    pub fn set_rate(&self, rate: u64) -> Result<(), Error> {
        let best = self.find_best(rate).ok_or(Error::InvalidArgument)?;
        let config = SrcDiv {
            src_sel: self.parents[best.request.best_parent].cfg,
            div: best.div - 1,
        };

        let mut current = self.current.lock();
        self.set_src_div(config)?;
        *current = config;
        Ok(())
    }

    /// Switches parent and rate together.
    ///
    /// `index` must be the parent chosen by [`Self::determine_rate`] for `rate`.
    pub fn set_rate_and_parent(&self, rate: u64, index: usize) -> Result<(), Error> {
        if index >= self.parents.len() {
            return Err(Error::InvalidArgument);
        }
        self.set_rate(rate)
    }

    /// Ungates the clock by programming the last configuration again.
    pub fn enable(&self) -> Result<(), Error> {
        let current = self.current.lock();
        self.set_src_div(*current)
    }

    /// Parks the clock on its safe source, if it has one.
    ///
    /// Returns [`Error::InvalidArgument`] if the safe source is not one of the parents or the safe
    /// rate is 0.
    ///
    /// The configuration restored by [`Self::enable`] is left unchanged.
    pub fn disable(&self) -> Result<(), Error> {
        let (Some(safe_src), Some(_)) = (self.config.safe_src, self.config.safe_freq) else {
            return Ok(());
        };
        let (index, safe_freq) = self.safe_parent().ok_or(Error::InvalidArgument)?;

        let parent_rate = self.parents[index].clock.rate();
        let mask = field_mask(self.config.hid_width);
        let ratio = div_round_closest(parent_rate, safe_freq);
        let div = match ratio.checked_sub(1) {
            Some(div) => u32::try_from(div).unwrap_or(mask).min(mask),
            None => mask,
        };

        let _current = self.current.lock();
        self.set_src_div(SrcDiv {
            src_sel: safe_src,
            div: div.wrapping_mul(2) | 1,
        })
    }

    /// Returns the index of the parent to park on while disabled, and the rate to run at.
    ///
    /// Returns `None` if no safe source and rate are configured, or the safe source is not one of
    /// the parents.
    pub fn safe_parent(&self) -> Option<(usize, u64)> {
        let safe_src = self.config.safe_src?;
        let safe_freq = self.config.safe_freq.filter(|&freq| freq != 0)?;
        let index = self
            .parents
            .iter()
            .position(|parent| parent.cfg == safe_src)?;
        Some((index, safe_freq))
    }

    /// Returns the index of the parent selected in hardware.
    ///
    /// If the configuration can't be read, is pending, or selects an unknown source, this logs an
    /// error and returns 0.
    pub fn get_parent(&self) -> u8 {
        let Some(config) = self.read_config_or_log() else {
            return 0;
        };
        match self.parent_index(config.src_sel) {
            Some(index) => u8::try_from(index).unwrap_or(u8::MAX),
            None => {
                error!("{}: Can't find parent {}", self.config.name, config.src_sel);
                0
            }
        }
    }

    /// Switches to the parent with the given index, keeping the current divider.
    pub fn set_parent(&self, index: usize) -> Result<(), Error> {
        let parent = self.parents.get(index).ok_or(Error::InvalidArgument)?;

        let mut current = self.current.lock();
        let config = SrcDiv {
            src_sel: parent.cfg,
            div: current.div,
        };
        self.set_src_div(config)?;
        *current = config;
        Ok(())
    }

    /// Returns the output rate implied by the configuration in hardware, in Hz.
    ///
    /// If the configuration can't be read, is pending, or selects an unknown source, this logs an
    /// error and returns 0.
    pub fn recalc_rate(&self) -> u64 {
        let Some(config) = self.read_config_or_log() else {
            return 0;
        };
        match self.parent_index(config.src_sel) {
            Some(index) => mult_frac(
                self.parents[index].clock.rate(),
                2,
                u64::from(config.div) + 1,
            ),
            None => {
                error!("{}: Can't find parent {}", self.config.name, config.src_sel);
                0
            }
        }
    }

    /// Reads the source and divider from hardware.
    ///
    /// Returns `None` if a new configuration has been written but not yet latched.
    pub fn read_config(&self) -> Result<Option<SrcDiv>, Error> {
        let command = CmdRcgr::from_bits_retain(self.regmap.read(self.command_register())?);
        if command.contains(CmdRcgr::DIRTY_CFG) {
            return Ok(None);
        }

        let value = self.regmap.read(self.config_register())?;
        Ok(Some(SrcDiv {
            src_sel: extract_field(value, self.config.src_width, self.config.src_shift),
            div: extract_field(value, self.config.hid_width, self.config.hid_shift),
        }))
    }

    fn read_config_or_log(&self) -> Option<SrcDiv> {
        match self.read_config() {
            Ok(Some(config)) => Some(config),
            Ok(None) => {
                error!("{}: RCG configuration is pending", self.config.name);
                None
            }
            Err(e) => {
                error!("{}: Failed to read RCG configuration: {e}", self.config.name);
                None
            }
        }
    }

    fn parent_index(&self, src_sel: u32) -> Option<usize> {
        self.parents.iter().position(|parent| parent.cfg == src_sel)
    }

    fn find_best(&self, rate: u64) -> Option<Candidate> {
        let max_div = field_mask(self.config.hid_width);
        let mut best: Option<Candidate> = None;

        for (index, parent) in self.parents.iter().enumerate() {
            for div in 1..max_div {
                let parent_rate = parent.clock.round_rate(parent_rate_for(rate, div));
                let actual = mult_frac(parent_rate, 2, div.into());

                let best_rate = best.map_or(0, |best| best.request.rate);
                if is_better_rate(rate, best_rate, actual) {
                    best = Some(Candidate {
                        request: RateRequest {
                            rate: actual,
                            best_parent_rate: parent_rate,
                            best_parent: index,
                        },
                        div,
                    });
                }

                let best_rate = best.map_or(0, |best| best.request.rate);
                if actual < rate || best_rate <= rate {
                    break;
                }
            }
        }

        if let Some(best) = best {
            debug!(
                "{}: {rate} Hz best matched by {} Hz from parent {} divided by {}/2",
                self.config.name, best.request.rate, best.request.best_parent, best.div
            );
        }
        best
    }

    /// Writes a new source and divider and waits for the hardware to latch them.
    ///
    /// Must be called with `current` locked.
    fn set_src_div(&self, config: SrcDiv) -> Result<(), Error> {
        let MuxDivConfig {
            hid_width,
            hid_shift,
            src_width,
            src_shift,
            ..
        } = self.config;
        let value = insert_field(config.div, hid_width, hid_shift)
            | insert_field(config.src_sel, src_width, src_shift);
        let mask = insert_field(u32::MAX, hid_width, hid_shift)
            | insert_field(u32::MAX, src_width, src_shift);
        self.regmap.update_bits(self.config_register(), mask, value)?;
        self.update_config()
    }

    fn update_config(&self) -> Result<(), Error> {
        let command = self.command_register();
        self.regmap
            .update_bits(command, CmdRcgr::UPDATE.bits(), CmdRcgr::UPDATE.bits())?;

        for _ in 0..UPDATE_POLLS {
            let value = CmdRcgr::from_bits_retain(self.regmap.read(command)?);
            if !value.contains(CmdRcgr::UPDATE) {
                return Ok(());
            }
            self.delay.udelay(1);
        }

        error!("{}: RCG did not update its configuration", self.config.name);
        Err(Error::Busy)
    }

    fn command_register(&self) -> u32 {
        self.config.reg_offset + CMD_RCGR
    }

    fn config_register(&self) -> u32 {
        self.config.reg_offset + CFG_RCGR
    }
}
