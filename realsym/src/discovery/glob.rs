//! Shell-style glob matching for shared object paths
//!
//! Matching is delegated to `fnmatch(3)` with no flags, so `*` and `?` also
//! match `/`, and bracket expressions get the C library's full syntax
//! (ranges, `!`/`^` negation, `[:digit:]`-style classes). Paths are compared
//! as raw bytes, so non-UTF-8 paths are handled.

#![allow(unsafe_code)] // fnmatch

use std::ffi::CString;
use std::fmt;

/// A glob pattern ready to be matched against object paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    source: String,
    /// `None` when the source contains a NUL byte; such a pattern matches nothing
    c_pattern: Option<CString>,
}

impl Pattern {
    /// Never fails: malformed brackets are matched literally by `fnmatch`.
    #[must_use]
    pub fn new(source: &str) -> Self {
        Self { source: source.to_string(), c_pattern: CString::new(source).ok() }
    }

    /// Match the whole of `text` against the pattern
    #[must_use]
    pub fn matches(&self, text: &[u8]) -> bool {
        let Some(pattern) = &self.c_pattern else {
            return false;
        };
        // Paths handed out by the loader are C strings and never contain NUL
        let Ok(text) = CString::new(text) else {
            return false;
        };
        // SAFETY: both arguments are valid NUL-terminated strings
        unsafe { libc::fnmatch(pattern.as_ptr(), text.as_ptr(), 0) == 0 }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
