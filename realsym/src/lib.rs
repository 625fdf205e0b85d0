//! # realsym - in-memory ELF symbol resolution without `dlsym`
//!
//! realsym finds exported symbols in shared objects that are already mapped
//! into the current process by reading their dynamic symbol tables straight
//! out of memory. It exists for libraries that replace `dlsym` itself (for
//! example an `LD_PRELOAD` hook) and therefore need another way to reach the
//! real implementation.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │              Caller (hook library / realsym CLI)                │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ "*libc.so*", "dlsym"
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        realsym (this crate)                     │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │  Discovery   │──▶│Symbolization │──▶│  Bootstrap   │         │
//! │  │ (locate .so) │   │ (dynsym walk)│   │ (real dlsym) │         │
//! │  └──────────────┘   └──────────────┘   └──────────────┘         │
//! │         │                   │                                   │
//! │         ▼                   ▼                                   │
//! │  dl_iterate_phdr     PT_DYNAMIC, DT_GNU_HASH / DT_HASH,         │
//! │  /proc/self/maps     DT_SYMTAB, DT_STRTAB                       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`discovery`]: enumerate loaded objects and pick one by glob pattern
//! - [`symbolization`]: resolve a symbol name to its runtime address in a
//!   located object, bounds-checked against the object's mapped segments
//! - [`bootstrap`]: find and cache the real `dlsym`; the only place that may
//!   terminate the process
//! - [`cli`]: argument definitions for the `realsym` inspection binary
//! - [`domain`]: address newtype and error types
//!
//! ## Typical Usage
//!
//! ```no_run
//! use realsym::{locate, resolve};
//!
//! let libc = locate("*libc.so*")?;
//! let getpid = resolve(&libc, "getpid")?;
//! println!("getpid is at {getpid}");
//! libc.release();
//! # Ok::<(), realsym::LookupError>(())
//! ```
//!
//! Only objects the loader already has mapped are considered; nothing is
//! loaded, and lookups never go through `dlopen`/`dlsym`.

pub mod bootstrap;
pub mod cli;
pub mod discovery;
pub mod domain;
pub mod symbolization;

pub use bootstrap::{call_real_dlsym, real_dlsym, try_real_dlsym, DlsymFn, EXIT_BOOTSTRAP_FAILURE};
pub use discovery::{loaded_objects, locate, LoadedObject, Pattern};
pub use domain::{BootstrapError, LookupError, SymbolAddress};
pub use symbolization::{lookup, resolve, ResolvedSymbol};
