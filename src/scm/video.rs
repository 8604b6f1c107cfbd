// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Video firmware state and content protection.

use super::{CallId, Error, SVC_BOOT, SVC_MP, Scm, SecureMonitor, iommu::Pair};
use crate::cache::DataCache;
use zerocopy::{Immutable, IntoBytes, KnownLayout, byteorder::little_endian::U32};

const VIDEO_SET_STATE: CallId = CallId::new(SVC_BOOT, 0xa);
const MEM_PROTECT_VIDEO_VAR: CallId = CallId::new(SVC_MP, 0x8);

#[derive(Clone, Debug, Eq, IntoBytes, Immutable, KnownLayout, PartialEq)]
#[repr(C)]
struct ProtectVideoRequest {
    cp_start: U32,
    cp_size: U32,
    cp_nonpixel_start: U32,
    cp_nonpixel_size: U32,
}

impl<M: SecureMonitor, C: DataCache> Scm<M, C> {
    /// Suspends or resumes the video processor firmware.
    ///
    /// A non-zero status from the secure world is reported as [`Error::InvalidArgument`].
    pub fn set_video_state(&self, state: u32, spare: u32) -> Result<(), Error> {
        let status: U32 = self.call_typed(VIDEO_SET_STATE, &Pair::new(state, spare))?;
        if status.get() != 0 {
            return Err(Error::InvalidArgument);
        }
        Ok(())
    }

    /// Sets the content protected regions of video memory, for pixel and non-pixel data.
    ///
    /// A non-zero status from the secure world is reported as [`Error::InvalidArgument`].
    pub fn mem_protect_video_var(
        &self,
        start: u32,
        size: u32,
        nonpixel_start: u32,
        nonpixel_size: u32,
    ) -> Result<(), Error> {
        let request = ProtectVideoRequest {
            cp_start: start.into(),
            cp_size: size.into(),
            cp_nonpixel_start: nonpixel_start.into(),
            cp_nonpixel_size: nonpixel_size.into(),
        };
        let status: U32 = self.call_typed(MEM_PROTECT_VIDEO_VAR, &request)?;
        if status.get() != 0 {
            return Err(Error::InvalidArgument);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::fake::FakeCache,
        scm::{FirmwareError, ScmConfig, fake::FakeMonitor},
    };

    fn video_scm(status: u32) -> Scm<FakeMonitor, FakeCache> {
        let monitor = FakeMonitor::with_buffered(move |_, _, response| {
            response.copy_from_slice(&status.to_le_bytes());
            0
        });
        Scm::new(monitor, FakeCache::new(), ScmConfig::default())
    }

    #[test]
    fn video_state() {
        let scm = video_scm(0);
        scm.set_video_state(1, 0).unwrap();

        let seen = scm.monitor().last_buffer().unwrap();
        assert_eq!(&seen[12..16], &VIDEO_SET_STATE.buffered().to_le_bytes());
        assert_eq!(&seen[16..24], &[1, 0, 0, 0, 0, 0, 0, 0]);

        assert_eq!(
            video_scm(3).set_video_state(0, 0),
            Err(Error::InvalidArgument)
        );
    }

    #[test]
    fn protect_video_var() {
        let scm = video_scm(0);
        scm.mem_protect_video_var(0x1000, 0x2000, 0x3000, 0x400)
            .unwrap();

        let seen = scm.monitor().last_buffer().unwrap();
        assert_eq!(
            &seen[12..16],
            &MEM_PROTECT_VIDEO_VAR.buffered().to_le_bytes()
        );
        assert_eq!(
            &seen[16..32],
            &[0, 0x10, 0, 0, 0, 0x20, 0, 0, 0, 0x30, 0, 0, 0, 0x04, 0, 0]
        );

        assert_eq!(
            video_scm(1).mem_protect_video_var(0, 0, 0, 0),
            Err(Error::InvalidArgument)
        );
    }

    #[test]
    fn trap_error_passes_through() {
        let monitor = FakeMonitor::with_buffered(|_, _, _| FirmwareError::Generic.into());
        let scm = Scm::new(monitor, FakeCache::new(), ScmConfig::default());

        assert_eq!(
            scm.set_video_state(1, 0),
            Err(Error::Firmware(FirmwareError::Generic))
        );
    }
}
