// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Peripheral Authentication Service: loading and starting signed firmware images for remote
//! processors.

use super::{CallId, Error, SVC_PIL, Scm, SecureMonitor};
use crate::cache::DataCache;
use log::debug;
use zerocopy::{Immutable, IntoBytes, KnownLayout, byteorder::little_endian::U32};

const INIT_IMAGE: CallId = CallId::new(SVC_PIL, 0x1);
const MEM_SETUP: CallId = CallId::new(SVC_PIL, 0x2);
const AUTH_AND_RESET: CallId = CallId::new(SVC_PIL, 0x5);
const SHUTDOWN: CallId = CallId::new(SVC_PIL, 0x6);
const IS_SUPPORTED: CallId = CallId::new(SVC_PIL, 0x7);
const MSS_RESET: CallId = CallId::new(SVC_PIL, 0xa);

#[derive(Clone, Debug, Eq, IntoBytes, Immutable, KnownLayout, PartialEq)]
#[repr(C)]
struct InitImageRequest {
    peripheral: U32,
    image_addr: U32,
}

#[derive(Clone, Debug, Eq, IntoBytes, Immutable, KnownLayout, PartialEq)]
#[repr(C)]
struct MemSetupRequest {
    peripheral: U32,
    addr: U32,
    len: U32,
}

/// Converts a physical address or size to its 32-bit wire form.
pub(super) fn wire_u32(value: u64) -> Result<U32, Error> {
    u32::try_from(value)
        .map(U32::new)
        .map_err(|_| Error::InvalidArgument)
}

impl<M: SecureMonitor, C: DataCache> Scm<M, C> {
    /// Returns whether the secure world can authenticate images for the given peripheral.
    ///
    /// Any failure to ask is treated as not supported.
    pub fn pas_supported(&self, peripheral: u32) -> bool {
        match self.call_typed::<U32, U32>(IS_SUPPORTED, &U32::new(peripheral)) {
            Ok(supported) => supported.get() != 0,
            Err(e) => {
                debug!("PAS support query for peripheral {peripheral} failed: {e}");
                false
            }
        }
    }

    /// Passes the metadata of a peripheral image to the secure world for authentication.
    ///
    /// `metadata_phys` is the physical address of the image header and hash segment.
    pub fn pas_init_image(&self, peripheral: u32, metadata_phys: u64) -> Result<(), Error> {
        let request = InitImageRequest {
            peripheral: peripheral.into(),
            image_addr: wire_u32(metadata_phys)?,
        };
        let status: U32 = self.call_typed(INIT_IMAGE, &request)?;
        Error::check_status(status.get())
    }

    /// Tells the secure world where in physical memory the peripheral image will be loaded.
    pub fn pas_mem_setup(&self, peripheral: u32, addr: u64, size: u64) -> Result<(), Error> {
        let request = MemSetupRequest {
            peripheral: peripheral.into(),
            addr: wire_u32(addr)?,
            len: wire_u32(size)?,
        };
        let status: U32 = self.call_typed(MEM_SETUP, &request)?;
        Error::check_status(status.get())
    }

    /// Authenticates the loaded image and takes the peripheral out of reset.
    pub fn pas_auth_and_reset(&self, peripheral: u32) -> Result<(), Error> {
        let status: U32 = self.call_typed(AUTH_AND_RESET, &U32::new(peripheral))?;
        Error::check_status(status.get())
    }

    /// Stops the peripheral and releases its image memory.
    pub fn pas_shutdown(&self, peripheral: u32) -> Result<(), Error> {
        let status: U32 = self.call_typed(SHUTDOWN, &U32::new(peripheral))?;
        Error::check_status(status.get())
    }

    /// Asserts or deasserts the modem subsystem reset.
    pub fn pas_mss_reset(&self, reset: bool) -> Result<(), Error> {
        let _: U32 = self.call_typed(MSS_RESET, &U32::new(reset.into()))?;
        Ok(())
    }
}
