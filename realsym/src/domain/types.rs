//! Domain types shared by the locator, the resolver and the bootstrap path

use serde::Serialize;
use std::ffi::c_void;
use std::fmt;

/// Runtime address of a resolved symbol
///
/// A bare pointer value. It stays meaningful only while the object that
/// exported it remains mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SymbolAddress(pub usize);

impl SymbolAddress {
    #[must_use]
    pub fn get(self) -> usize {
        self.0
    }

    #[must_use]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub fn as_ptr(self) -> *mut c_void {
        self.0 as *mut c_void
    }

    /// Distance from `base`, or `None` if the address lies below it
    #[must_use]
    pub fn offset_from(self, base: usize) -> Option<usize> {
        self.0.checked_sub(base)
    }
}

impl fmt::Display for SymbolAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl From<SymbolAddress> for usize {
    fn from(addr: SymbolAddress) -> Self {
        addr.0
    }
}
