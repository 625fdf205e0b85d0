//! Bounds-checked reads from a mapped object
//!
//! Every dereference the resolver performs goes through [`Image`]. An address
//! is only read if the whole span lies inside one of the object's confirmed
//! segments; anything else becomes a [`Corruption`] instead of a fault.

#![allow(unsafe_code)] // reads live process memory

use crate::discovery::MemoryRange;
use crate::domain::Corruption;
use std::mem::size_of;

#[derive(Debug, Clone, Copy)]
pub(crate) struct Image<'a> {
    segments: &'a [MemoryRange],
    bias: usize,
}

impl<'a> Image<'a> {
    /// `segments` must only contain ranges that stay mapped readable for `'a`
    pub(crate) fn new(segments: &'a [MemoryRange], bias: usize) -> Self {
        Self { segments, bias }
    }

    fn segment_for(&self, addr: usize) -> Option<&MemoryRange> {
        self.segments.iter().find(|s| s.contains(addr))
    }

    pub(crate) fn contains_span(&self, addr: usize, len: usize) -> bool {
        self.segments.iter().any(|s| s.contains_span(addr, len))
    }

    pub(crate) fn check(&self, what: &'static str, addr: usize, len: usize) -> Result<(), Corruption> {
        if self.contains_span(addr, len) {
            Ok(())
        } else {
            Err(Corruption::OutOfBounds { what, addr, len })
        }
    }

    /// Read a `T` at `addr`
    pub(crate) fn read<T: Copy>(&self, what: &'static str, addr: usize) -> Result<T, Corruption> {
        self.check(what, addr, size_of::<T>())?;
        // SAFETY: the span lies in a readable segment (checked above); the
        // value is copied out, so alignment does not matter.
        Ok(unsafe { std::ptr::read_unaligned(addr as *const T) })
    }

    pub(crate) fn read_u32(&self, what: &'static str, addr: usize) -> Result<u32, Corruption> {
        self.read::<u32>(what, addr)
    }

    /// Address of element `index` in an array of `size`-byte entries at `base`
    pub(crate) fn element(
        what: &'static str,
        base: usize,
        index: usize,
        size: usize,
    ) -> Result<usize, Corruption> {
        index
            .checked_mul(size)
            .and_then(|offset| base.checked_add(offset))
            .ok_or(Corruption::OutOfBounds { what, addr: base, len: size })
    }

    /// Turn a dynamic-section pointer into a runtime address
    ///
    /// glibc rewrites `d_ptr` entries to absolute addresses when it relocates
    /// an object; musl and the vDSO leave them relative to the load bias.
    pub(crate) fn translate(&self, tag: &'static str, value: usize) -> Result<usize, Corruption> {
        if self.segment_for(value).is_some() {
            return Ok(value);
        }
        let relocated = self.bias.wrapping_add(value);
        if self.segment_for(relocated).is_some() {
            return Ok(relocated);
        }
        Err(Corruption::DanglingPointer { tag, value })
    }

    /// The NUL-terminated string at `addr`, without the terminator
    ///
    /// The terminator must appear before `limit` (exclusive) when given, and
    /// always before the end of the segment holding `addr`.
    pub(crate) fn c_str(&self, addr: usize, limit: Option<usize>) -> Result<&'a [u8], Corruption> {
        let segment = self
            .segment_for(addr)
            .ok_or(Corruption::OutOfBounds { what: "symbol name", addr, len: 1 })?;
        let end = limit.map_or(segment.end, |limit| limit.min(segment.end));
        if end <= addr {
            return Err(Corruption::UnterminatedName { addr });
        }

        // SAFETY: [addr, end) lies inside one readable segment that outlives 'a
        let bytes = unsafe { std::slice::from_raw_parts(addr as *const u8, end - addr) };
        let nul = bytes.iter().position(|&b| b == 0).ok_or(Corruption::UnterminatedName { addr })?;
        Ok(&bytes[..nul])
    }
}
