// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Drivers for two Qualcomm platform-firmware interfaces:
//!
//! - [`scm`]: a client for the Secure Channel Manager, which marshals requests into a shared
//!   command/response buffer and traps into the secure monitor with `smc`.
//! - [`clk::mux_div`]: the RCG mux/divider clock, which picks a source and half-integer divider for
//!   a requested rate and programs them through a register map.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod aarch64;
pub mod cache;
pub mod clk;
pub mod logger;
pub mod scm;
