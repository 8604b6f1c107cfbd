// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! HDCP service: register writes to the HDMI transmitter's protected key registers.

use super::{CallId, Error, SVC_HDCP, Scm, SecureMonitor};
use crate::cache::DataCache;
use arrayvec::ArrayVec;
use zerocopy::{Immutable, IntoBytes, KnownLayout, byteorder::little_endian::U32};

const HDCP: CallId = CallId::new(SVC_HDCP, 0x1);

/// The maximum number of register writes in a single HDCP call.
pub const HDCP_MAX_REQUESTS: usize = 5;

/// A single register write.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HdcpRequest {
    /// Physical address of the register.
    pub addr: u32,
    /// Value to write.
    pub val: u32,
}

#[derive(Clone, Debug, Eq, IntoBytes, Immutable, KnownLayout, PartialEq)]
#[repr(C)]
struct WireHdcpRequest {
    addr: U32,
    val: U32,
}

impl<M: SecureMonitor, C: DataCache> Scm<M, C> {
    /// Has the secure world perform up to [`HDCP_MAX_REQUESTS`] register writes, returning its
    /// response word.
    pub fn hdcp_req(&self, requests: &[HdcpRequest]) -> Result<u32, Error> {
        let mut wire = ArrayVec::<WireHdcpRequest, HDCP_MAX_REQUESTS>::new();
        for request in requests {
            wire.try_push(WireHdcpRequest {
                addr: request.addr.into(),
                val: request.val.into(),
            })
            .map_err(|_| Error::InvalidArgument)?;
        }

        let mut response = U32::ZERO;
        self.call(HDCP, wire.as_bytes(), response.as_mut_bytes())?;
        Ok(response.get())
    }
}
