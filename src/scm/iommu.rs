// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Secure IOMMU page table management and the related memory protection calls.

use super::{CallId, Error, SVC_MP, SVC_UTIL, Scm, SecureMonitor, pas::wire_u32};
use crate::cache::DataCache;
use log::debug;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, byteorder::little_endian::U32};

const DUMP_SMMU_FAULT_REGS: CallId = CallId::new(SVC_UTIL, 0xc);
const RESTORE_SEC_CFG: CallId = CallId::new(SVC_MP, 0x2);
const SECURE_PTBL_SIZE: CallId = CallId::new(SVC_MP, 0x3);
const SECURE_PTBL_INIT: CallId = CallId::new(SVC_MP, 0x4);
const SET_CP_POOL_SIZE: CallId = CallId::new(SVC_MP, 0x5);
const SECURE_MAP2: CallId = CallId::new(SVC_MP, 0xb);
const SECURE_UNMAP2: CallId = CallId::new(SVC_MP, 0xc);

/// A list of physical pages to map into a secure IOMMU context.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct IommuPageList {
    /// Physical address of the array of page addresses.
    pub list: u64,
    /// Number of entries in the array.
    pub list_size: u32,
    /// Size of each page, in bytes.
    pub size: u32,
}

/// The IOMMU context and virtual address range for a secure mapping.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct IommuMapInfo {
    /// IOMMU instance.
    pub id: u32,
    /// Context bank within the IOMMU.
    pub ctx_id: u32,
    /// Device virtual address of the start of the range.
    pub va: u64,
    /// Size of the range, in bytes.
    pub size: u32,
}

#[derive(Clone, Debug, Eq, IntoBytes, Immutable, KnownLayout, PartialEq)]
#[repr(C)]
struct WirePageList {
    list: U32,
    list_size: U32,
    size: U32,
}

#[derive(Clone, Debug, Eq, IntoBytes, Immutable, KnownLayout, PartialEq)]
#[repr(C)]
struct WireMapInfo {
    id: U32,
    ctx_id: U32,
    va: U32,
    size: U32,
}

impl TryFrom<&IommuMapInfo> for WireMapInfo {
    type Error = Error;

    fn try_from(info: &IommuMapInfo) -> Result<Self, Error> {
        Ok(Self {
            id: info.id.into(),
            ctx_id: info.ctx_id.into(),
            va: wire_u32(info.va)?,
            size: info.size.into(),
        })
    }
}

#[derive(Clone, Debug, Eq, IntoBytes, Immutable, KnownLayout, PartialEq)]
#[repr(C)]
struct SecureMapRequest {
    plist: WirePageList,
    info: WireMapInfo,
    flags: U32,
}

#[derive(Clone, Debug, Eq, IntoBytes, Immutable, KnownLayout, PartialEq)]
#[repr(C)]
struct SecureUnmapRequest {
    info: WireMapInfo,
    flags: U32,
}

#[derive(Clone, Debug, Eq, IntoBytes, Immutable, KnownLayout, PartialEq)]
#[repr(C)]
struct FaultRegsRequest {
    id: U32,
    context: U32,
    addr: U32,
    len: U32,
}

#[derive(Clone, Debug, Eq, IntoBytes, Immutable, KnownLayout, PartialEq)]
#[repr(C)]
struct PtblInitRequest {
    addr: U32,
    size: U32,
    spare: U32,
}

/// Two 32-bit values, used for requests of a value and a spare word.
#[derive(Clone, Debug, Eq, FromBytes, IntoBytes, Immutable, KnownLayout, PartialEq)]
#[repr(C)]
pub(super) struct Pair {
    pub first: U32,
    pub second: U32,
}

impl Pair {
    pub fn new(first: u32, second: u32) -> Self {
        Self {
            first: first.into(),
            second: second.into(),
        }
    }
}

impl<M: SecureMonitor, C: DataCache> Scm<M, C> {
    /// Returns the size of memory the secure world needs for its IOMMU page tables, and a second
    /// word whose meaning depends on the secure world version.
    pub fn iommu_secure_ptbl_size(&self, spare: u32) -> Result<[u32; 2], Error> {
        let size: Pair = self.call_typed(SECURE_PTBL_SIZE, &U32::new(spare))?;
        Ok([size.first.get(), size.second.get()])
    }

    /// Donates memory to the secure world for its IOMMU page tables.
    pub fn iommu_secure_ptbl_init(&self, addr: u64, size: u32, spare: u32) -> Result<(), Error> {
        let request = PtblInitRequest {
            addr: wire_u32(addr)?,
            size: size.into(),
            spare: spare.into(),
        };
        let status: U32 = self.call_typed(SECURE_PTBL_INIT, &request)?;
        Error::check_status(status.get())
    }

    /// Sets the size of the content protection memory pool.
    pub fn iommu_set_cp_pool_size(&self, size: u32, spare: u32) -> Result<(), Error> {
        let _: U32 = self.call_typed(SET_CP_POOL_SIZE, &Pair::new(size, spare))?;
        Ok(())
    }

    /// Maps a list of pages into a secure IOMMU context.
    ///
    /// Every failure, including a non-zero status from the secure world, is reported as
    /// [`Error::InvalidArgument`].
    pub fn iommu_secure_map(
        &self,
        list: &IommuPageList,
        info: &IommuMapInfo,
        flags: u32,
    ) -> Result<(), Error> {
        let request = SecureMapRequest {
            plist: WirePageList {
                list: wire_u32(list.list)?,
                list_size: list.list_size.into(),
                size: list.size.into(),
            },
            info: info.try_into()?,
            flags: flags.into(),
        };
        match self.call_typed::<_, U32>(SECURE_MAP2, &request) {
            Ok(status) if status.get() == 0 => Ok(()),
            Ok(status) => {
                debug!("Secure IOMMU map of {info:?} failed with status {:#x}", status.get());
                Err(Error::InvalidArgument)
            }
            Err(e) => {
                debug!("Secure IOMMU map of {info:?} failed: {e}");
                Err(Error::InvalidArgument)
            }
        }
    }

    /// Removes a range from a secure IOMMU context.
    pub fn iommu_secure_unmap(&self, info: &IommuMapInfo, flags: u32) -> Result<(), Error> {
        let request = SecureUnmapRequest {
            info: info.try_into()?,
            flags: flags.into(),
        };
        let _: U32 = self.call_typed(SECURE_UNMAP2, &request)?;
        Ok(())
    }

    /// Asks the secure world to dump the fault registers of an IOMMU context bank into the buffer
    /// at physical address `addr`.
    pub fn iommu_dump_fault_regs(
        &self,
        id: u32,
        context: u32,
        addr: u64,
        len: u32,
    ) -> Result<(), Error> {
        let request = FaultRegsRequest {
            id: id.into(),
            context: context.into(),
            addr: wire_u32(addr)?,
            len: len.into(),
        };
        self.call(DUMP_SMMU_FAULT_REGS, request.as_bytes(), &mut [0; 1])
    }

    /// Restores the secure configuration of a device after it lost power.
    ///
    /// A non-zero status from the secure world is reported as [`Error::InvalidArgument`].
    pub fn restore_sec_cfg(&self, device_id: u32, spare: u32) -> Result<(), Error> {
        let status: U32 = self.call_typed(RESTORE_SEC_CFG, &Pair::new(device_id, spare))?;
        if status.get() != 0 {
            return Err(Error::InvalidArgument);
        }
        Ok(())
    }
}
