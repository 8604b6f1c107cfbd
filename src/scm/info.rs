// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Info service: feature discovery.

use super::{CallId, Error, INTERRUPTED, REGISTER_CLASS, SVC_INFO, Scm, SecureMonitor};
use crate::cache::DataCache;
use log::debug;
use zerocopy::byteorder::little_endian::U32;

const IS_CALL_AVAIL: CallId = CallId::new(SVC_INFO, 0x1);
const GET_FEAT_VERSION: CallId = CallId::new(SVC_INFO, 0x3);

impl<M: SecureMonitor, C: DataCache> Scm<M, C> {
    /// Asks the secure world whether it implements the given call.
    pub fn is_call_available(&self, id: CallId) -> Result<bool, Error> {
        let available: U32 = self.call_typed(IS_CALL_AVAIL, &U32::new(id.buffered()))?;
        Ok(available.get() != 0)
    }

    /// Returns the SCM interface version.
    ///
    /// The secure world is only asked once; later calls return the cached value.
    pub fn version(&self) -> u32 {
        *self.version.call_once(|| {
            let _guard = self.lock.lock();
            loop {
                let (ret, version) = self.monitor.smc_register(REGISTER_CLASS, 0);
                if ret != INTERRUPTED {
                    debug!("SCM version {version:#x}");
                    break version;
                }
            }
        })
    }

    /// Returns the version of the given secure world feature, or 0 if the secure world can't
    /// report it.
    pub fn feat_version(&self, feature: u32) -> u32 {
        if !matches!(self.is_call_available(GET_FEAT_VERSION), Ok(true)) {
            return 0;
        }
        match self.call_typed::<U32, U32>(GET_FEAT_VERSION, &U32::new(feature)) {
            Ok(version) => version.get(),
            Err(e) => {
                debug!("Failed to get version of feature {feature:#x}: {e}");
                0
            }
        }
    }
}
