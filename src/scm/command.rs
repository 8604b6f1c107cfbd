// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! The buffer shared with the secure world for a single SCM call.
//!
//! An SCM command is laid out in memory as follows:
//!
//! ```text
//! +-----------------+ <- command header, offsets below are relative to here
//! | command header  |
//! +-----------------+ <- buf_offset
//! | command payload |
//! +-----------------+ <- resp_hdr_offset
//! | response header |
//! +-----------------+ <- response buf_offset, relative to the response header
//! | response payload|
//! +-----------------+
//! ```
//!
//! The secure world may move the response payload by rewriting the response `buf_offset`, so the
//! response is always located through the header rather than assumed to follow it.

use super::Error;
use alloc::alloc::{Layout, alloc_zeroed, dealloc};
use core::{mem::size_of, ops::Range, ptr::NonNull, slice};
use zerocopy::{
    FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout, byteorder::little_endian::U32,
};

/// Granule to which command buffers are sized and aligned, so that no unrelated data shares a page
/// with memory handed to the secure world.
pub const PAGE_SIZE: usize = 4096;

/// Size in bytes of [`CommandHeader`].
pub const COMMAND_HEADER_SIZE: usize = size_of::<CommandHeader>();

/// Size in bytes of [`ResponseHeader`].
pub const RESPONSE_HEADER_SIZE: usize = size_of::<ResponseHeader>();

/// Offset of `is_complete` within [`ResponseHeader`].
const IS_COMPLETE_OFFSET: usize = 8;

/// Header at the start of every command buffer.
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct CommandHeader {
    /// Total length of both headers and both payloads, not including page padding.
    pub len: U32,
    /// Start of the command payload, relative to this header.
    pub buf_offset: U32,
    /// Start of the response header, relative to this header.
    pub resp_hdr_offset: U32,
    /// Combined service and command identifier, see [`super::CallId`].
    pub id: U32,
}

/// Header written by the secure world in front of the response payload.
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct ResponseHeader {
    /// Length of the response header and payload.
    pub len: U32,
    /// Start of the response payload, relative to this header.
    pub buf_offset: U32,
    /// Non-zero once the secure world has finished processing the command.
    pub is_complete: U32,
}

/// A zeroed, page-aligned command buffer, freed when dropped.
#[derive(Debug)]
pub struct CommandBuffer {
    ptr: NonNull<u8>,
    layout: Layout,
    cmd_len: usize,
    resp_len: usize,
}

impl CommandBuffer {
    /// Allocates a buffer with room for a `cmd_len` byte command payload and a `resp_len` byte
    /// response payload, and fills in both headers.
    ///
    /// Returns [`Error::OutOfMemory`] if the allocation fails or the sizes can't be represented in
    /// the 32-bit header fields.
    pub fn new(cmd_len: usize, resp_len: usize) -> Result<Self, Error> {
        let len = (COMMAND_HEADER_SIZE + RESPONSE_HEADER_SIZE)
            .checked_add(cmd_len)
            .and_then(|len| len.checked_add(resp_len))
            .ok_or(Error::OutOfMemory)?;
        let wire_len = u32::try_from(len).map_err(|_| Error::OutOfMemory)?;
        let size = len
            .checked_next_multiple_of(PAGE_SIZE)
            .ok_or(Error::OutOfMemory)?;
        let layout = Layout::from_size_align(size, PAGE_SIZE).map_err(|_| Error::OutOfMemory)?;

        // SAFETY: `layout` has a non-zero size, as it holds at least both headers.
        let ptr = NonNull::new(unsafe { alloc_zeroed(layout) }).ok_or(Error::OutOfMemory)?;

        let mut buffer = Self {
            ptr,
            layout,
            cmd_len,
            resp_len,
        };

        // Both offsets are below `len`, which fits in a u32.
        let command_header = CommandHeader {
            len: wire_len.into(),
            buf_offset: (COMMAND_HEADER_SIZE as u32).into(),
            resp_hdr_offset: (buffer.response_header_offset() as u32).into(),
            id: 0.into(),
        };
        let response_header = ResponseHeader {
            len: ((RESPONSE_HEADER_SIZE + resp_len) as u32).into(),
            buf_offset: (RESPONSE_HEADER_SIZE as u32).into(),
            is_complete: 0.into(),
        };
        let response_header_offset = buffer.response_header_offset();
        let bytes = buffer.as_bytes_mut();
        bytes[..COMMAND_HEADER_SIZE].copy_from_slice(command_header.as_bytes());
        bytes[response_header_offset..response_header_offset + RESPONSE_HEADER_SIZE]
            .copy_from_slice(response_header.as_bytes());

        Ok(buffer)
    }

    /// Returns the whole allocation, including page padding.
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: `ptr` points to an allocation of `layout.size()` bytes which we own, zeroed when
        // allocated so every byte is initialised.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.layout.size()) }
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: As for `as_bytes`, and `&mut self` guarantees that there are no other references.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.layout.size()) }
    }

    /// Returns the virtual address of the start of the buffer.
    pub fn address(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// Returns the length recorded in the command header, i.e. the extent the secure world uses.
    pub fn len(&self) -> usize {
        COMMAND_HEADER_SIZE + self.cmd_len + RESPONSE_HEADER_SIZE + self.resp_len
    }

    /// Returns the size of the allocation, a whole number of pages.
    pub fn allocated_len(&self) -> usize {
        self.layout.size()
    }

    /// Returns a copy of the command header.
    pub fn command_header(&self) -> CommandHeader {
        let mut header = CommandHeader::new_zeroed();
        header
            .as_mut_bytes()
            .copy_from_slice(&self.as_bytes()[..COMMAND_HEADER_SIZE]);
        header
    }

    /// Sets the call identifier in the command header.
    pub fn set_id(&mut self, id: u32) {
        self.as_bytes_mut()[12..COMMAND_HEADER_SIZE].copy_from_slice(&id.to_le_bytes());
    }

    /// Returns the command payload.
    pub fn command_payload(&self) -> &[u8] {
        &self.as_bytes()[COMMAND_HEADER_SIZE..COMMAND_HEADER_SIZE + self.cmd_len]
    }

    /// Returns the command payload for writing.
    pub fn command_payload_mut(&mut self) -> &mut [u8] {
        let cmd_len = self.cmd_len;
        &mut self.as_bytes_mut()[COMMAND_HEADER_SIZE..COMMAND_HEADER_SIZE + cmd_len]
    }

    /// Returns the offset of the response header from the start of the buffer.
    pub fn response_header_offset(&self) -> usize {
        COMMAND_HEADER_SIZE + self.cmd_len
    }

    /// Returns the virtual address range of the response header.
    pub fn response_header_range(&self) -> Range<usize> {
        let start = self.address() + self.response_header_offset();
        start..start + RESPONSE_HEADER_SIZE
    }

    /// Returns a copy of the response header.
    pub fn response_header(&self) -> ResponseHeader {
        let offset = self.response_header_offset();
        let mut header = ResponseHeader::new_zeroed();
        header
            .as_mut_bytes()
            .copy_from_slice(&self.as_bytes()[offset..offset + RESPONSE_HEADER_SIZE]);
        header
    }

    /// Returns whether the secure world has marked the command complete.
    ///
    /// This reads memory directly so that each poll observes whatever the last cache invalidation
    /// fetched.
    pub fn is_complete(&self) -> bool {
        let offset = self.response_header_offset() + IS_COMPLETE_OFFSET;
        // SAFETY: `offset + 4` is within the allocation, and `[u8; 4]` has no alignment
        // requirement.
        let raw = unsafe { self.ptr.as_ptr().add(offset).cast::<[u8; 4]>().read_volatile() };
        u32::from_le_bytes(raw) != 0
    }

    /// Returns the offset from the start of the buffer of the response payload, as currently
    /// described by the response header.
    ///
    /// Fails with [`Error::MalformedResponse`] if the header places the payload outside the
    /// allocation.
    pub fn response_payload_offset(&self) -> Result<usize, Error> {
        let buf_offset = self.response_header().buf_offset.get() as usize;
        let start = self.response_header_offset() + buf_offset;
        match start.checked_add(self.resp_len) {
            Some(end) if buf_offset >= RESPONSE_HEADER_SIZE && end <= self.allocated_len() => {
                Ok(start)
            }
            _ => Err(Error::MalformedResponse),
        }
    }

    /// Returns the response payload.
    pub fn response_payload(&self) -> Result<&[u8], Error> {
        let start = self.response_payload_offset()?;
        Ok(&self.as_bytes()[start..start + self.resp_len])
    }

    /// Returns the response payload for writing.
    ///
    /// This is the secure world's side of the protocol, for use by simulated monitors.
    pub fn response_payload_mut(&mut self) -> Result<&mut [u8], Error> {
        let start = self.response_payload_offset()?;
        let resp_len = self.resp_len;
        Ok(&mut self.as_bytes_mut()[start..start + resp_len])
    }

    /// Moves the response payload to `offset` bytes after the start of the response header.
    ///
    /// This is the secure world's side of the protocol, for use by simulated monitors.
    pub fn set_response_offset(&mut self, offset: u32) {
        let start = self.response_header_offset() + 4;
        self.as_bytes_mut()[start..start + 4].copy_from_slice(&offset.to_le_bytes());
    }

    /// Marks the command complete.
    ///
    /// This is the secure world's side of the protocol, for use by simulated monitors.
    pub fn mark_complete(&mut self) {
        let offset = self.response_header_offset() + IS_COMPLETE_OFFSET;
        self.as_bytes_mut()[offset..offset + 4].copy_from_slice(&1u32.to_le_bytes());
    }
}

impl Drop for CommandBuffer {
    fn drop(&mut self) {
        // SAFETY: `ptr` was allocated in `new` with the same `layout` and is not used again.
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) }
    }
}
