//! # Symbol Resolution Without the Loader
//!
//! This module turns a [`LoadedObject`](crate::discovery::LoadedObject) and a
//! symbol name into a runtime address by reading the object's own dynamic
//! linking metadata. It never calls `dlsym`, which is the point: the caller
//! may have replaced `dlsym` and needs the original.
//!
//! ## Where the Data Lives
//!
//! Every dynamically linked ELF object carries a `PT_DYNAMIC` segment, an
//! array of `(tag, value)` pairs terminated by `DT_NULL`. The tags used here:
//!
//! | Tag           | Meaning                                         |
//! |---------------|-------------------------------------------------|
//! | `DT_SYMTAB`   | dynamic symbol table (`Elf_Sym[]`)              |
//! | `DT_STRTAB`   | string table holding the symbol names           |
//! | `DT_STRSZ`    | size of the string table in bytes               |
//! | `DT_SYMENT`   | size of one symbol entry                        |
//! | `DT_GNU_HASH` | GNU hash table (bloom filter + buckets + chains)|
//! | `DT_HASH`     | SysV hash table (buckets + chains)              |
//!
//! ## Load Bias
//!
//! Symbol values are link-time addresses. At runtime the object sits somewhere
//! else, and the difference is the load bias:
//!
//! ```text
//! Runtime Address = Load Bias + st_value
//! ```
//!
//! `SHN_ABS` symbols are the exception: their value is already absolute.
//!
//! Pointer tags in the dynamic section have the same problem one level up.
//! glibc rewrites them to absolute addresses when it relocates an object,
//! musl and the vDSO do not. Each pointer is accepted as absolute if it lands
//! inside the object, or as bias-relative if that lands inside the object.
//!
//! ## Safety Contract
//!
//! The loader's own lookup is bypassed, so nothing else validates this data.
//! All reads go through a bounds-checked view of the object's confirmed
//! segments. An offset that leads outside them is reported as
//! [`LookupError::Corrupt`](crate::domain::LookupError::Corrupt) rather than
//! read.
//!
//! ## Module Structure
//!
//! - **`elf`**: `#[repr(C)]` dynamic-section and symbol layouts
//! - **`image`**: bounds-checked memory reads
//! - **`dynamic`**: `PT_DYNAMIC` walk
//! - **`hash`**: GNU and SysV hash table lookup
//! - **`resolver`**: the public [`resolve`] / [`lookup`] entry points

pub mod elf;
pub(crate) mod image;
pub mod hash;
pub mod resolver;
mod dynamic;

pub use hash::{gnu_hash, sysv_hash};
pub use resolver::{lookup, resolve, ResolvedSymbol};
