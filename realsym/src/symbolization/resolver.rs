//! Symbol lookup in a located object
//!
//! Reads `DT_SYMTAB`/`DT_STRTAB` through the object's dynamic section and
//! searches them for an exact name, using `DT_GNU_HASH`, then `DT_HASH`, then
//! a bounded linear scan. Every step reads through [`Image`], so malformed
//! metadata surfaces as [`LookupError::Corrupt`].

use super::dynamic::DynamicInfo;
use super::elf::ElfSym;
use super::hash::{GnuHashTable, SysvHashTable};
use super::image::Image;
use crate::discovery::LoadedObject;
use crate::domain::{Corruption, LookupError, SymbolAddress};
use log::{debug, trace};
use serde::Serialize;
use std::mem::size_of;

/// A matched dynamic symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedSymbol {
    /// Index in the dynamic symbol table
    pub index: u32,
    /// Raw `st_value`
    pub value: usize,
    /// `SHN_ABS`: `value` was used as-is, without the load bias
    pub absolute: bool,
    pub address: SymbolAddress,
}

/// Runtime address of the exported symbol `name` in `object`
///
/// # Errors
/// - [`LookupError::SymbolNotFound`] / [`LookupError::NoDynamicSymbols`]
/// - [`LookupError::Corrupt`] if the metadata points outside the object
pub fn resolve(object: &LoadedObject, name: &str) -> Result<SymbolAddress, LookupError> {
    lookup(object, name).map(|symbol| symbol.address)
}

/// Like [`resolve`], keeping the table entry details
///
/// # Errors
/// Same as [`resolve`]
pub fn lookup(object: &LoadedObject, name: &str) -> Result<ResolvedSymbol, LookupError> {
    let corrupt = |reason: Corruption| LookupError::Corrupt { object: object.path().to_path_buf(), reason };
    let no_symbols = || LookupError::NoDynamicSymbols { object: object.path().to_path_buf() };

    let dynamic = object.dynamic_section().ok_or_else(no_symbols)?;
    let image = object.image();
    let info = DynamicInfo::read(&image, dynamic).map_err(corrupt)?;
    let (Some(symtab), Some(strtab)) = (info.symtab, info.strtab) else {
        return Err(no_symbols());
    };

    let table = SymbolTable::new(image, symtab, strtab, &info).map_err(corrupt)?;
    let Some((index, sym)) = table.find(&info, name.as_bytes()).map_err(corrupt)? else {
        debug!("'{name}' not found in {}", object.path().display());
        return Err(LookupError::SymbolNotFound {
            symbol: name.to_string(),
            object: object.path().to_path_buf(),
        });
    };

    let value = sym.value();
    let absolute = sym.is_absolute();
    let address = if absolute { value } else { object.load_bias().wrapping_add(value) };
    trace!("'{name}' is symbol #{index} in {}: value 0x{value:x}", object.path().display());

    Ok(ResolvedSymbol { index, value, absolute, address: SymbolAddress(address) })
}

struct SymbolTable<'a> {
    image: Image<'a>,
    symtab: usize,
    strtab: usize,
    strsz: Option<usize>,
}

impl<'a> SymbolTable<'a> {
    fn new(image: Image<'a>, symtab: usize, strtab: usize, info: &DynamicInfo) -> Result<Self, Corruption> {
        if let Some(syment) = info.syment {
            if syment != size_of::<ElfSym>() {
                return Err(Corruption::SymbolEntrySize(syment));
            }
        }
        if let Some(size) = info.strsz {
            image.check("string table", strtab, size)?;
        }
        Ok(Self { image, symtab, strtab, strsz: info.strsz })
    }

    fn symbol(&self, index: u32) -> Result<ElfSym, Corruption> {
        let addr = Image::element("symbol entry", self.symtab, index as usize, size_of::<ElfSym>())?;
        self.image.read("symbol entry", addr)
    }

    fn name(&self, sym: &ElfSym) -> Result<&'a [u8], Corruption> {
        let offset = sym.st_name as usize;
        if let Some(size) = self.strsz {
            if offset >= size {
                return Err(Corruption::NameOffsetOutOfRange { offset, size });
            }
        }
        let addr = self
            .strtab
            .checked_add(offset)
            .ok_or(Corruption::OutOfBounds { what: "symbol name", addr: self.strtab, len: offset })?;
        // `new` checked that the whole table is mapped, so this cannot overflow
        let limit = self.strsz.map(|size| self.strtab + size);
        self.image.c_str(addr, limit)
    }

    /// Whether entry `index` is a definition named exactly `name`
    fn is_match(&self, index: u32, name: &[u8]) -> Result<bool, Corruption> {
        let sym = self.symbol(index)?;
        if !sym.is_defined() {
            return Ok(false);
        }
        Ok(self.name(&sym)? == name)
    }

    fn find(&self, info: &DynamicInfo, name: &[u8]) -> Result<Option<(u32, ElfSym)>, Corruption> {
        let probe = |index| self.is_match(index, name);

        let index = if let Some(addr) = info.gnu_hash {
            trace!("Searching DT_GNU_HASH at 0x{addr:x}");
            GnuHashTable::read(&self.image, addr)?.find(&self.image, name, probe)?
        } else if let Some(addr) = info.hash {
            trace!("Searching DT_HASH at 0x{addr:x}");
            SysvHashTable::read(&self.image, addr)?.find(&self.image, name, probe)?
        } else {
            self.scan(name)?
        };

        index.map(|index| self.symbol(index).map(|sym| (index, sym))).transpose()
    }

    /// Linear search for objects without a hash table
    ///
    /// The entry count is not recorded anywhere else, so it is taken from
    /// the gap between the symbol table and the string table that the static
    /// linker places right after it.
    fn scan(&self, name: &[u8]) -> Result<Option<u32>, Corruption> {
        if self.strtab <= self.symtab {
            return Err(Corruption::UnknownSymbolCount);
        }
        let count = (self.strtab - self.symtab) / size_of::<ElfSym>();
        let count = u32::try_from(count).map_err(|_| Corruption::UnknownSymbolCount)?;
        trace!("Scanning {count} symbols linearly");

        // Entry 0 is always the reserved null symbol
        for index in 1..count {
            if self.is_match(index, name)? {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::super::elf::{ElfDyn, DT_GNU_HASH, DT_HASH, DT_STRSZ, DT_STRTAB, DT_SYMENT, DT_SYMTAB};
    use super::super::hash::gnu_hash;
    use super::*;
    use crate::discovery::MemoryRange;
    use object::elf::SHN_ABS;
    use std::path::PathBuf;

    const IMAGE_SIZE: usize = 0x1000;
    const DYN_OFF: usize = 0x000;
    const SYM_OFF: usize = 0x200;
    const STR_OFF: usize = 0x600;
    const HASH_OFF: usize = 0x800;
    const TEXT_SHNDX: u16 = 13;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Lookup {
        Gnu,
        Sysv,
        Linear,
    }

    const ALL_LOOKUPS: [Lookup; 3] = [Lookup::Gnu, Lookup::Sysv, Lookup::Linear];

    struct Entry {
        /// Name used for hashing
        name: String,
        sym: ElfSym,
    }

    /// Builds a fake shared object in a heap buffer: dynamic section, symbol
    /// table, string table and one hash table, laid out at fixed offsets
    struct Builder {
        entries: Vec<Entry>,
        strings: Vec<u8>,
        lookup: Lookup,
        relative_pointers: bool,
        with_strsz: bool,
        syment: usize,
        extra_dynamic: Vec<(isize, usize)>,
    }

    impl Builder {
        fn new(lookup: Lookup) -> Self {
            Self {
                entries: Vec::new(),
                strings: vec![0],
                lookup,
                relative_pointers: true,
                with_strsz: true,
                syment: size_of::<ElfSym>(),
                extra_dynamic: Vec::new(),
            }
        }

        fn add_string(&mut self, name: &str) -> u32 {
            let offset = u32::try_from(self.strings.len()).unwrap();
            self.strings.extend_from_slice(name.as_bytes());
            self.strings.push(0);
            offset
        }

        fn push(mut self, name: &str, st_name: u32, value: usize, shndx: u16) -> Self {
            let sym = ElfSym {
                st_name,
                st_info: 0x12, // STB_GLOBAL | STT_FUNC
                st_shndx: shndx,
                st_value: value as _,
                ..ElfSym::default()
            };
            self.entries.push(Entry { name: name.to_string(), sym });
            self
        }

        fn function(mut self, name: &str, value: usize) -> Self {
            let st_name = self.add_string(name);
            self.push(name, st_name, value, TEXT_SHNDX)
        }

        fn absolute(mut self, name: &str, value: usize) -> Self {
            let st_name = self.add_string(name);
            self.push(name, st_name, value, SHN_ABS)
        }

        fn import(mut self, name: &str) -> Self {
            let st_name = self.add_string(name);
            self.push(name, st_name, 0, 0)
        }

        /// A definition whose name offset is `st_name`, hashed as `hashed_as`
        fn raw_name(self, hashed_as: &str, st_name: u32, value: usize) -> Self {
            self.push(hashed_as, st_name, value, TEXT_SHNDX)
        }

        fn absolute_pointers(mut self) -> Self {
            self.relative_pointers = false;
            self
        }

        fn without_strsz(mut self) -> Self {
            self.with_strsz = false;
            self
        }

        fn syment(mut self, size: usize) -> Self {
            self.syment = size;
            self
        }

        fn dynamic(mut self, tag: isize, value: usize) -> Self {
            self.extra_dynamic.push((tag, value));
            self
        }

        fn build(self) -> Synthetic {
            let mut synthetic = Synthetic { buf: vec![0u8; IMAGE_SIZE] };
            let base = synthetic.base();
            let ptr = |offset: usize| if self.relative_pointers { offset } else { base + offset };

            // Index 0 is the null symbol
            for (i, entry) in self.entries.iter().enumerate() {
                synthetic.put(SYM_OFF + (i + 1) * size_of::<ElfSym>(), entry.sym);
            }
            synthetic.buf[STR_OFF..STR_OFF + self.strings.len()].copy_from_slice(&self.strings);

            let nsyms = u32::try_from(self.entries.len() + 1).unwrap();
            let mut dynamic = vec![(DT_SYMTAB, ptr(SYM_OFF)), (DT_STRTAB, ptr(STR_OFF))];
            if self.with_strsz {
                dynamic.push((DT_STRSZ, self.strings.len()));
            }
            dynamic.push((DT_SYMENT, self.syment));

            match self.lookup {
                Lookup::Sysv => {
                    // One bucket, one chain through every entry in order
                    synthetic.put_u32(HASH_OFF, 1);
                    synthetic.put_u32(HASH_OFF + 4, nsyms);
                    synthetic.put_u32(HASH_OFF + 8, u32::from(nsyms > 1));
                    let chains = HASH_OFF + 12;
                    for i in 1..nsyms {
                        let next = if i + 1 < nsyms { i + 1 } else { 0 };
                        synthetic.put_u32(chains + 4 * i as usize, next);
                    }
                    dynamic.push((DT_HASH, ptr(HASH_OFF)));
                }
                Lookup::Gnu => {
                    // One bucket, a bloom filter that lets everything through
                    synthetic.put_u32(HASH_OFF, 1);
                    synthetic.put_u32(HASH_OFF + 4, 1);
                    synthetic.put_u32(HASH_OFF + 8, 1);
                    synthetic.put_u32(HASH_OFF + 12, 6);
                    synthetic.put(HASH_OFF + 16, usize::MAX);
                    let buckets = HASH_OFF + 16 + size_of::<usize>();
                    synthetic.put_u32(buckets, u32::from(nsyms > 1));
                    let chains = buckets + 4;
                    for (i, entry) in self.entries.iter().enumerate() {
                        let last = i + 1 == self.entries.len();
                        let hash = gnu_hash(entry.name.as_bytes()) & !1 | u32::from(last);
                        synthetic.put_u32(chains + 4 * i, hash);
                    }
                    dynamic.push((DT_GNU_HASH, ptr(HASH_OFF)));
                }
                Lookup::Linear => {}
            }

            dynamic.extend(self.extra_dynamic);
            for (i, (d_tag, d_val)) in dynamic.into_iter().enumerate() {
                synthetic.put(DYN_OFF + i * size_of::<ElfDyn>(), ElfDyn { d_tag, d_val });
            }
            // The zeroed entry after the last one is DT_NULL
            synthetic
        }
    }

    struct Synthetic {
        buf: Vec<u8>,
    }

    impl Synthetic {
        fn base(&self) -> usize {
            self.buf.as_ptr() as usize
        }

        fn put<T: Copy>(&mut self, offset: usize, value: T) {
            assert!(offset + size_of::<T>() <= self.buf.len());
            unsafe { std::ptr::write_unaligned(self.buf.as_mut_ptr().add(offset).cast::<T>(), value) }
        }

        fn put_u32(&mut self, offset: usize, value: u32) {
            self.put(offset, value);
        }

        fn object(&self) -> LoadedObject {
            self.object_with_dynamic(Some(self.base() + DYN_OFF))
        }

        fn object_with_dynamic(&self, dynamic: Option<usize>) -> LoadedObject {
            let base = self.base();
            let segments = vec![MemoryRange { start: base, end: base + IMAGE_SIZE }];
            // SAFETY: the buffer outlives every handle built in these tests
            unsafe { LoadedObject::from_raw_parts(PathBuf::from("/synthetic/libtest.so"), base, dynamic, segments) }
        }
    }

    fn assert_corrupt(result: Result<SymbolAddress, LookupError>) -> Corruption {
        match result {
            Err(LookupError::Corrupt { reason, .. }) => reason,
            other => panic!("expected corrupt metadata, got {other:?}"),
        }
    }

    #[test]
    fn test_bias_correction_is_exact() {
        for lookup in ALL_LOOKUPS {
            for absolute_pointers in [false, true] {
                let mut builder = Builder::new(lookup).function("open", 0x1100).function("dlsym", 0x2468);
                if absolute_pointers {
                    builder = builder.absolute_pointers();
                }
                let image = builder.build();
                let object = image.object();

                let symbol = lookup_symbol(&object, "dlsym");
                assert_eq!(symbol.index, 2, "{lookup:?}");
                assert_eq!(symbol.value, 0x2468);
                assert!(!symbol.absolute);
                assert_eq!(symbol.address.get(), image.base() + 0x2468, "{lookup:?}");
                assert_eq!(symbol.address.offset_from(object.load_bias()), Some(0x2468));

                assert_eq!(resolve(&object, "open").unwrap().get(), image.base() + 0x1100);
                object.release();
            }
        }
    }

    fn lookup_symbol(object: &LoadedObject, name: &str) -> ResolvedSymbol {
        lookup(object, name).unwrap_or_else(|e| panic!("lookup of {name} failed: {e}"))
    }

    #[test]
    fn test_no_partial_matches() {
        for lookup in ALL_LOOKUPS {
            let image = Builder::new(lookup).function("dlsym2", 0x10).function("dl", 0x20).build();
            let object = image.object();

            let err = resolve(&object, "dlsym").unwrap_err();
            assert!(matches!(err, LookupError::SymbolNotFound { ref symbol, .. } if symbol == "dlsym"), "{lookup:?}");
            assert!(resolve(&object, "dlsym23").unwrap_err().is_not_found());
            assert_eq!(resolve(&object, "dlsym2").unwrap().get(), image.base() + 0x10);
        }
    }

    #[test]
    fn test_absolute_symbols_skip_bias() {
        for lookup in ALL_LOOKUPS {
            let image = Builder::new(lookup).absolute("LINUX_2.6", 0).absolute("magic", 0x4242).build();
            let object = image.object();

            let symbol = lookup_symbol(&object, "magic");
            assert!(symbol.absolute);
            assert_eq!(symbol.address, SymbolAddress(0x4242), "{lookup:?}");
        }
    }

    #[test]
    fn test_imports_are_not_exports() {
        for lookup in [Lookup::Sysv, Lookup::Linear] {
            let image = Builder::new(lookup).import("malloc").function("free", 0x30).build();
            let object = image.object();
            assert!(resolve(&object, "malloc").unwrap_err().is_not_found(), "{lookup:?}");
            assert!(resolve(&object, "free").is_ok());
        }
    }

    #[test]
    fn test_first_match_wins() {
        for lookup in [Lookup::Sysv, Lookup::Linear] {
            let image = Builder::new(lookup).function("dup", 0x100).function("dup", 0x200).build();
            let object = image.object();
            assert_eq!(lookup_symbol(&object, "dup").value, 0x100, "{lookup:?}");
        }
    }

    #[test]
    fn test_name_offset_past_string_table() {
        for lookup in ALL_LOOKUPS {
            let image = Builder::new(lookup).raw_name("dlsym", 0x300, 0x40).build();
            let reason = assert_corrupt(resolve(&image.object(), "dlsym"));
            assert!(matches!(reason, Corruption::NameOffsetOutOfRange { offset: 0x300, .. }), "{lookup:?}: {reason}");
        }
    }

    #[test]
    fn test_name_offset_past_mapped_region() {
        for lookup in ALL_LOOKUPS {
            let image = Builder::new(lookup).without_strsz().raw_name("dlsym", 0x10_0000, 0x40).build();
            let reason = assert_corrupt(resolve(&image.object(), "dlsym"));
            assert!(matches!(reason, Corruption::OutOfBounds { what: "symbol name", .. }), "{lookup:?}: {reason}");
        }
    }

    #[test]
    fn test_missing_dynamic_metadata_is_not_found() {
        let image = Builder::new(Lookup::Sysv).function("dlsym", 0x10).build();

        let err = resolve(&image.object_with_dynamic(None), "dlsym").unwrap_err();
        assert!(matches!(err, LookupError::NoDynamicSymbols { .. }));
        assert!(err.is_not_found());

        // A dynamic section holding only DT_NULL
        let empty = Synthetic { buf: vec![0u8; IMAGE_SIZE] };
        let err = resolve(&empty.object(), "dlsym").unwrap_err();
        assert!(matches!(err, LookupError::NoDynamicSymbols { .. }));
    }

    #[test]
    fn test_dynamic_section_outside_object() {
        let image = Builder::new(Lookup::Sysv).function("dlsym", 0x10).build();
        let object = image.object_with_dynamic(Some(image.base() + IMAGE_SIZE + 0x40));
        let reason = assert_corrupt(resolve(&object, "dlsym"));
        assert!(matches!(reason, Corruption::OutOfBounds { what: "dynamic entry", .. }));
    }

    #[test]
    fn test_dangling_table_pointer() {
        let image = Builder::new(Lookup::Linear).function("dlsym", 0x10).dynamic(DT_HASH, 0x8000).build();
        let reason = assert_corrupt(resolve(&image.object(), "dlsym"));
        assert_eq!(reason, Corruption::DanglingPointer { tag: "DT_HASH", value: 0x8000 });
    }

    #[test]
    fn test_unexpected_symbol_entry_size() {
        let image = Builder::new(Lookup::Sysv).function("dlsym", 0x10).syment(7).build();
        let reason = assert_corrupt(resolve(&image.object(), "dlsym"));
        assert_eq!(reason, Corruption::SymbolEntrySize(7));
    }

    #[test]
    fn test_cyclic_sysv_chain() {
        let mut image = Builder::new(Lookup::Sysv).function("other", 0x10).function("more", 0x20).build();
        // chain[2] -> 1 makes 1 -> 2 -> 1 -> ...
        image.put_u32(HASH_OFF + 12 + 4 * 2, 1);
        let reason = assert_corrupt(resolve(&image.object(), "dlsym"));
        assert_eq!(reason, Corruption::ChainCycle);
    }

    #[test]
    fn test_sysv_chain_index_out_of_range() {
        let mut image = Builder::new(Lookup::Sysv).function("other", 0x10).build();
        image.put_u32(HASH_OFF + 8, 99);
        let reason = assert_corrupt(resolve(&image.object(), "dlsym"));
        assert_eq!(reason, Corruption::ChainIndex { index: 99, limit: 2 });
    }

    #[test]
    fn test_gnu_bloom_filter_rejects() {
        let mut image = Builder::new(Lookup::Gnu).function("dlsym", 0x10).build();
        image.put(HASH_OFF + 16, 0usize);
        assert!(resolve(&image.object(), "dlsym").unwrap_err().is_not_found());
    }

    #[test]
    fn test_gnu_empty_bloom_filter_is_corrupt() {
        let mut image = Builder::new(Lookup::Gnu).function("dlsym", 0x10).build();
        image.put_u32(HASH_OFF + 8, 0);
        let reason = assert_corrupt(resolve(&image.object(), "dlsym"));
        assert_eq!(reason, Corruption::EmptyBloomFilter);
    }
}
