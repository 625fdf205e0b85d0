//! In-memory ELF structures read by the resolver
//!
//! Only the dynamic-linking subset is described here. Field layouts follow the
//! native word size because the structures are read straight out of objects
//! mapped into this process, which always share its ELF class.

use object::elf;

/// `Elf{32,64}_Dyn`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ElfDyn {
    pub d_tag: isize,
    /// `d_un`: `d_val` or `d_ptr`
    pub d_val: usize,
}

/// `Elf64_Sym`
#[cfg(target_pointer_width = "64")]
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ElfSym {
    pub st_name: u32,
    pub st_info: u8,
    pub st_other: u8,
    pub st_shndx: u16,
    pub st_value: u64,
    pub st_size: u64,
}

/// `Elf32_Sym`
#[cfg(target_pointer_width = "32")]
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ElfSym {
    pub st_name: u32,
    pub st_value: u32,
    pub st_size: u32,
    pub st_info: u8,
    pub st_other: u8,
    pub st_shndx: u16,
}

impl ElfSym {
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn value(&self) -> usize {
        self.st_value as usize
    }

    /// Imports carry `SHN_UNDEF`; they name a symbol without defining it
    #[must_use]
    pub fn is_defined(&self) -> bool {
        self.st_shndx != elf::SHN_UNDEF
    }

    /// `SHN_ABS` values are absolute and must not be adjusted by the load bias
    #[must_use]
    pub fn is_absolute(&self) -> bool {
        self.st_shndx == elf::SHN_ABS
    }
}

// `object` declares tags as u32; the in-memory `d_tag` is a signed word.
// DT_GNU_HASH (0x6ffffef5) still fits in a 32-bit isize.
#[allow(clippy::cast_possible_wrap)]
pub const DT_NULL: isize = elf::DT_NULL as isize;
#[allow(clippy::cast_possible_wrap)]
pub const DT_HASH: isize = elf::DT_HASH as isize;
#[allow(clippy::cast_possible_wrap)]
pub const DT_STRTAB: isize = elf::DT_STRTAB as isize;
#[allow(clippy::cast_possible_wrap)]
pub const DT_SYMTAB: isize = elf::DT_SYMTAB as isize;
#[allow(clippy::cast_possible_wrap)]
pub const DT_STRSZ: isize = elf::DT_STRSZ as isize;
#[allow(clippy::cast_possible_wrap)]
pub const DT_SYMENT: isize = elf::DT_SYMENT as isize;
#[allow(clippy::cast_possible_wrap)]
pub const DT_GNU_HASH: isize = elf::DT_GNU_HASH as isize;
