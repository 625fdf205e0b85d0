//! Walking an object's `PT_DYNAMIC` segment
//!
//! Collects the handful of tags needed to find a symbol by name. Pointer tags
//! are translated to runtime addresses as they are read, so the rest of the
//! resolver only deals with addresses that point into the object.

use super::elf::{
    ElfDyn, DT_GNU_HASH, DT_HASH, DT_NULL, DT_STRSZ, DT_STRTAB, DT_SYMENT, DT_SYMTAB,
};
use super::image::Image;
use crate::domain::Corruption;
use std::mem::size_of;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct DynamicInfo {
    pub symtab: Option<usize>,
    pub strtab: Option<usize>,
    pub strsz: Option<usize>,
    pub syment: Option<usize>,
    pub hash: Option<usize>,
    pub gnu_hash: Option<usize>,
}

impl DynamicInfo {
    /// Read entries from `dynamic` up to `DT_NULL`
    ///
    /// The walk stops with an error if it runs off the end of the mapped
    /// segment before seeing `DT_NULL`.
    pub(crate) fn read(image: &Image<'_>, dynamic: usize) -> Result<Self, Corruption> {
        let mut info = Self::default();

        for index in 0.. {
            let addr = Image::element("dynamic entry", dynamic, index, size_of::<ElfDyn>())?;
            let entry: ElfDyn = image.read("dynamic entry", addr)?;
            match entry.d_tag {
                DT_NULL => break,
                DT_SYMTAB => info.symtab = Some(image.translate("DT_SYMTAB", entry.d_val)?),
                DT_STRTAB => info.strtab = Some(image.translate("DT_STRTAB", entry.d_val)?),
                DT_HASH => info.hash = Some(image.translate("DT_HASH", entry.d_val)?),
                DT_GNU_HASH => info.gnu_hash = Some(image.translate("DT_GNU_HASH", entry.d_val)?),
                DT_STRSZ => info.strsz = Some(entry.d_val),
                DT_SYMENT => info.syment = Some(entry.d_val),
                _ => {}
            }
        }

        Ok(info)
    }
}
