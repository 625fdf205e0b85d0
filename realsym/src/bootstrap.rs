//! Finding the real `dlsym` for a library that overrides it
//!
//! A hook library exporting its own `dlsym` cannot ask the loader for the
//! original one. This module searches a short list of candidate objects with
//! the locator and resolver, caches the first hit for the life of the process,
//! and is the only place allowed to terminate the process when nothing is
//! found.

use crate::discovery::locate;
use crate::domain::{Attempt, BootstrapError, LookupError};
use crate::symbolization::{lookup, ResolvedSymbol};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::cell::Cell;
use std::ffi::{c_char, c_void};
use std::path::PathBuf;
use std::sync::OnceLock;

/// Signature of `dlsym(3)`
pub type DlsymFn = unsafe extern "C" fn(*mut c_void, *const c_char) -> *mut c_void;

/// `EX_UNAVAILABLE`: the resolution primitive could not be found
pub const EXIT_BOOTSTRAP_FAILURE: i32 = 69;

/// Colon-separated glob list replacing [`DEFAULT_CANDIDATES`]
pub const CANDIDATES_ENV: &str = "REALSYM_CANDIDATES";

/// Where `dlsym` lives, most specific first. glibc before 2.34 keeps it in
/// libdl; afterwards libc exports it too.
#[cfg(target_env = "gnu")]
pub const DEFAULT_CANDIDATES: &[&str] = &["*libdl.so*", "*libc.so*", "*libc.*.so*"];

#[cfg(not(target_env = "gnu"))]
pub const DEFAULT_CANDIDATES: &[&str] = &["*libc.so*", "*libc.*.so*", "*ld-musl-*.so*"];

const DLSYM: &str = "dlsym";

static REAL_DLSYM: OnceLock<DlsymFn> = OnceLock::new();

thread_local! {
    static RESOLVING: Cell<bool> = const { Cell::new(false) };
}

/// A successful candidate search
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub pattern: String,
    pub object: PathBuf,
    pub symbol: ResolvedSymbol,
}

/// The candidate list in effect: [`CANDIDATES_ENV`] if set, else the defaults
#[must_use]
pub fn candidate_patterns() -> Vec<String> {
    match std::env::var(CANDIDATES_ENV) {
        Ok(value) if !value.trim().is_empty() => {
            value.split(':').map(str::trim).filter(|p| !p.is_empty()).map(String::from).collect()
        }
        _ => DEFAULT_CANDIDATES.iter().map(|p| (*p).to_string()).collect(),
    }
}

/// Try each candidate pattern in order until one exports `symbol`
///
/// Each located object is released before the next pattern is tried.
///
/// # Errors
/// [`BootstrapError::Unavailable`] listing every failed attempt
pub fn find_symbol<S: AsRef<str>>(candidates: &[S], symbol: &str) -> Result<Resolution, BootstrapError> {
    let mut attempts = Vec::new();

    for pattern in candidates.iter().map(AsRef::as_ref) {
        let object = match locate(pattern) {
            Ok(object) => object,
            Err(error) => {
                note_failure(pattern, &error);
                attempts.push(Attempt { pattern: pattern.to_string(), error });
                continue;
            }
        };

        let result = lookup(&object, symbol);
        let path = object.path().to_path_buf();
        object.release();

        match result {
            Ok(found) if !found.address.is_null() => {
                info!("Resolved {symbol} at {} in {} (via '{pattern}')", found.address, path.display());
                return Ok(Resolution { pattern: pattern.to_string(), object: path, symbol: found });
            }
            Ok(_) => {
                let error = LookupError::SymbolNotFound { symbol: symbol.to_string(), object: path };
                note_failure(pattern, &error);
                attempts.push(Attempt { pattern: pattern.to_string(), error });
            }
            Err(error) => {
                note_failure(pattern, &error);
                attempts.push(Attempt { pattern: pattern.to_string(), error });
            }
        }
    }

    Err(BootstrapError::Unavailable { symbol: symbol.to_string(), attempts })
}

fn note_failure(pattern: &str, error: &LookupError) {
    if error.is_corrupt() || error.is_enumeration_failure() {
        warn!("Candidate '{pattern}': {error}");
    } else {
        debug!("Candidate '{pattern}': {error}");
    }
}

/// The real `dlsym`, found once and cached
///
/// # Errors
/// - [`BootstrapError::Unavailable`] if no candidate exports `dlsym`
/// - [`BootstrapError::Reentrant`] if called again on a thread that is
///   already inside the search
pub fn try_real_dlsym() -> Result<DlsymFn, BootstrapError> {
    if let Some(real) = REAL_DLSYM.get() {
        return Ok(*real);
    }

    let _guard = ResolvingGuard::enter().ok_or_else(|| BootstrapError::Reentrant { symbol: DLSYM.to_string() })?;
    let found = find_symbol(&candidate_patterns(), DLSYM)?;

    #[allow(unsafe_code)]
    // SAFETY: the address is the `dlsym` definition exported by the C library
    let real = unsafe { std::mem::transmute::<*mut c_void, DlsymFn>(found.symbol.address.as_ptr()) };

    // A racing thread may have stored the same answer first; keep its value
    Ok(*REAL_DLSYM.get_or_init(|| real))
}

/// The real `dlsym`, terminating the process if it cannot be found
///
/// Nothing that depends on intercepting `dlsym` can work without it.
#[must_use]
pub fn real_dlsym() -> DlsymFn {
    match try_real_dlsym() {
        Ok(real) => real,
        Err(err) => abort_unavailable(&err),
    }
}

/// Forward a `dlsym` call to the real implementation
///
/// Returns null when the current thread is still searching for the real
/// `dlsym` (the search can itself trigger loader lookups). Terminates the
/// process if the search fails.
///
/// # Safety
/// Same contract as `dlsym(3)`: `symbol` must be a valid C string and
/// `handle` a valid handle or pseudo-handle.
#[allow(unsafe_code)]
pub unsafe fn call_real_dlsym(handle: *mut c_void, symbol: *const c_char) -> *mut c_void {
    match try_real_dlsym() {
        Ok(real) => real(handle, symbol),
        Err(BootstrapError::Reentrant { .. }) => std::ptr::null_mut(),
        Err(err) => abort_unavailable(&err),
    }
}

/// Report the missing primitive on stderr and exit with [`EXIT_BOOTSTRAP_FAILURE`]
pub fn abort_unavailable(err: &BootstrapError) -> ! {
    error!("{err}");
    eprintln!("error: {err}");
    std::process::exit(EXIT_BOOTSTRAP_FAILURE)
}

struct ResolvingGuard;

impl ResolvingGuard {
    fn enter() -> Option<Self> {
        // A thread whose TLS is already torn down is treated as re-entering
        let already = RESOLVING.try_with(|flag| flag.replace(true)).unwrap_or(true);
        // Only the outermost entry owns the flag; a refused entry must not
        // construct a guard, or its drop would clear the flag early
        if already {
            None
        } else {
            Some(Self)
        }
    }
}

impl Drop for ResolvingGuard {
    fn drop(&mut self) {
        let _ = RESOLVING.try_with(|flag| flag.set(false));
    }
}
