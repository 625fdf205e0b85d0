//! Domain model for realsym
//!
//! Core types and errors shared across the crate:
//! - Newtype addresses so a raw `usize` is never mistaken for a resolved symbol
//! - Structured, recoverable lookup errors and the one fatal bootstrap error

pub mod errors;
pub mod types;

pub use types::SymbolAddress;

pub use errors::{Attempt, BootstrapError, Corruption, LookupError};
