//! Structured error types for realsym
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! Everything in [`LookupError`] is recoverable: callers move on to the next
//! candidate pattern. [`BootstrapError`] is what the top-level bootstrap path
//! escalates to process termination.

use std::fmt::Write as _;
use std::path::PathBuf;
use thiserror::Error;

/// Why an object's dynamic metadata was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Corruption {
    #[error("{what} at 0x{addr:x} (+{len} bytes) is outside the object's mapped segments")]
    OutOfBounds { what: &'static str, addr: usize, len: usize },

    #[error("{tag} value 0x{value:x} does not point into the object")]
    DanglingPointer { tag: &'static str, value: usize },

    #[error("string table offset {offset} is past the end of the table ({size} bytes)")]
    NameOffsetOutOfRange { offset: usize, size: usize },

    #[error("symbol name at 0x{addr:x} is not NUL-terminated within its table")]
    UnterminatedName { addr: usize },

    #[error("unexpected symbol entry size {0}")]
    SymbolEntrySize(usize),

    #[error("GNU hash table has an empty bloom filter")]
    EmptyBloomFilter,

    #[error("hash chain references symbol {index}, table holds {limit}")]
    ChainIndex { index: u32, limit: u32 },

    #[error("hash chain does not terminate")]
    ChainCycle,

    #[error("symbol count cannot be derived without a hash table")]
    UnknownSymbolCount,
}

#[derive(Error, Debug)]
pub enum LookupError {
    #[error("no loaded object matches pattern '{pattern}'")]
    ObjectNotFound { pattern: String },

    #[error("symbol '{symbol}' not found in {}", .object.display())]
    SymbolNotFound { symbol: String, object: PathBuf },

    #[error("{} has no dynamic symbol table", .object.display())]
    NoDynamicSymbols { object: PathBuf },

    #[error("corrupt dynamic metadata in {}: {reason}", .object.display())]
    Corrupt { object: PathBuf, reason: Corruption },

    #[error("failed to enumerate loaded objects: {0}")]
    Enumeration(String),

    #[error("failed to read /proc/self/maps")]
    MemoryMaps(#[source] std::io::Error),
}

impl LookupError {
    /// Object or symbol absent; the caller should try the next candidate
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ObjectNotFound { .. } | Self::SymbolNotFound { .. } | Self::NoDynamicSymbols { .. }
        )
    }

    #[must_use]
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::Corrupt { .. })
    }

    /// The process could not be searched at all
    #[must_use]
    pub fn is_enumeration_failure(&self) -> bool {
        matches!(self, Self::Enumeration(_) | Self::MemoryMaps(_))
    }
}

/// One failed candidate during a bootstrap search
#[derive(Debug)]
pub struct Attempt {
    pub pattern: String,
    pub error: LookupError,
}

#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("{symbol} was not found in any candidate object ({})", render_attempts(.attempts))]
    Unavailable { symbol: String, attempts: Vec<Attempt> },

    #[error("lookup of {symbol} re-entered while it was still being resolved")]
    Reentrant { symbol: String },
}

fn render_attempts(attempts: &[Attempt]) -> String {
    if attempts.is_empty() {
        return "no candidate patterns".to_string();
    }
    let mut out = String::new();
    for (idx, attempt) in attempts.iter().enumerate() {
        if idx > 0 {
            out.push_str("; ");
        }
        let _ = write!(out, "{}: {}", attempt.pattern, attempt.error);
    }
    out
}
