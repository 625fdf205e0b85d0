//! # Object Discovery
//!
//! Finds the shared objects mapped into the current process and hands out
//! [`LoadedObject`] handles describing where each one lives.
//!
//! ```text
//! dl_iterate_phdr ──▶ path + load bias + PT_LOAD/PT_DYNAMIC
//!        │
//!        ▼
//!   glob match ("*libc.so*") ──▶ first hit in loader order
//!        │
//!        ▼
//! /proc/self/maps ──▶ keep segments that are really mapped readable
//!        │
//!        ▼
//!   LoadedObject (owned, released by value)
//! ```
//!
//! Enumeration order is whatever the loader's link map says. When several
//! objects match a pattern the first one wins; callers that care put their
//! most specific patterns first.

pub mod glob;
pub mod locator;
pub mod memory_maps;

pub use glob::Pattern;
pub use locator::{loaded_objects, locate, locate_with, LoadedObject};
pub use memory_maps::{MappedRegion, MemoryMap, MemoryRange};
