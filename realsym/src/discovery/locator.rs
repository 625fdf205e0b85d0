//! Finding loaded shared objects by path
//!
//! Objects are enumerated with `dl_iterate_phdr`, the loader's read-only view
//! of its link map, so nothing here goes through `dlopen`/`dlsym`. A matched
//! object's readable `PT_LOAD` segments are then confirmed against
//! `/proc/self/maps` before the resolver is allowed to read from them.

#![allow(unsafe_code)] // dl_iterate_phdr and the structures it hands out
#![allow(clippy::cast_possible_truncation)] // ELF words are native-sized here

use super::glob::Pattern;
use super::memory_maps::{MemoryMap, MemoryRange};
use crate::domain::LookupError;
use crate::symbolization::image::Image;
use libc::{c_int, c_void, dl_phdr_info, size_t};
use log::{debug, info};
use object::elf::{PF_R, PT_DYNAMIC, PT_LOAD};
use serde::Serialize;
use std::ffi::{CStr, OsStr};
use std::ops::ControlFlow;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

/// A shared object mapped into this process
///
/// Owned exclusively by whoever located it. [`LoadedObject::release`] consumes
/// the handle, so it cannot be used afterwards.
#[derive(Debug, Serialize)]
pub struct LoadedObject {
    path: PathBuf,
    base_address: usize,
    load_bias: usize,
    dynamic: Option<usize>,
    segments: Vec<MemoryRange>,
}

impl LoadedObject {
    /// Build a handle from already-known parts
    ///
    /// # Safety
    /// Every range in `segments` must be mapped readable for as long as the
    /// handle is alive, and `dynamic` (if any) must be an address the caller
    /// expects a dynamic section at.
    #[must_use]
    pub unsafe fn from_raw_parts(
        path: PathBuf,
        load_bias: usize,
        dynamic: Option<usize>,
        mut segments: Vec<MemoryRange>,
    ) -> Self {
        segments.sort();
        let base_address = segments.first().map_or(load_bias, |s| s.start);
        Self { path, base_address, load_bias, dynamic, segments }
    }

    /// Path reported by the loader (the executable's real path for the main program)
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runtime address of the first mapped segment
    #[must_use]
    pub fn base_address(&self) -> usize {
        self.base_address
    }

    /// Runtime address minus link-time address
    #[must_use]
    pub fn load_bias(&self) -> usize {
        self.load_bias
    }

    /// Runtime address of `PT_DYNAMIC`, if the object has one
    #[must_use]
    pub fn dynamic_section(&self) -> Option<usize> {
        self.dynamic
    }

    /// Readable segments confirmed against the process memory map
    #[must_use]
    pub fn segments(&self) -> &[MemoryRange] {
        &self.segments
    }

    pub(crate) fn image(&self) -> Image<'_> {
        Image::new(&self.segments, self.load_bias)
    }

    /// Give the handle back
    pub fn release(self) {
        debug!("Released {}", self.path.display());
    }
}

/// What `dl_iterate_phdr` reports for one object, before confirmation
struct RawObject {
    path: PathBuf,
    load_bias: usize,
    dynamic: Option<usize>,
    segments: Vec<MemoryRange>,
}

impl RawObject {
    /// Keep only the segments the kernel actually has mapped readable
    fn confirm(self, map: &MemoryMap) -> LoadedObject {
        let (segments, dropped): (Vec<_>, Vec<_>) =
            self.segments.into_iter().partition(|segment| map.covers(*segment));
        for segment in &dropped {
            debug!(
                "{}: segment 0x{:x}-0x{:x} is not readable in /proc/self/maps, ignoring it",
                self.path.display(),
                segment.start,
                segment.end
            );
        }
        // SAFETY: every remaining segment is backed by a readable mapping
        unsafe { LoadedObject::from_raw_parts(self.path, self.load_bias, self.dynamic, segments) }
    }
}

/// Locate the first loaded object whose path matches `pattern`
///
/// # Errors
/// - [`LookupError::ObjectNotFound`] if nothing matches
/// - [`LookupError::Enumeration`] / [`LookupError::MemoryMaps`] if the process
///   could not be inspected
pub fn locate(pattern: &str) -> Result<LoadedObject, LookupError> {
    locate_with(&Pattern::new(pattern))
}

/// [`locate`] with a precompiled pattern
///
/// # Errors
/// Same as [`locate`]
pub fn locate_with(pattern: &Pattern) -> Result<LoadedObject, LookupError> {
    let mut found = None;
    for_each_object(|raw| {
        if pattern.matches(raw.path.as_os_str().as_bytes()) {
            found = Some(raw);
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    })?;

    let Some(raw) = found else {
        debug!("No loaded object matches '{pattern}'");
        return Err(LookupError::ObjectNotFound { pattern: pattern.to_string() });
    };

    let object = raw.confirm(&MemoryMap::current()?);
    info!(
        "Located {} for '{pattern}' (base 0x{:x}, bias 0x{:x}, {} segments)",
        object.path.display(),
        object.base_address,
        object.load_bias,
        object.segments.len()
    );
    Ok(object)
}

/// Every loaded object, in the loader's enumeration order
///
/// # Errors
/// [`LookupError::Enumeration`] / [`LookupError::MemoryMaps`] if the process
/// could not be inspected
pub fn loaded_objects() -> Result<Vec<LoadedObject>, LookupError> {
    let mut raw_objects = Vec::new();
    for_each_object(|raw| {
        raw_objects.push(raw);
        ControlFlow::Continue(())
    })?;

    let map = MemoryMap::current()?;
    Ok(raw_objects.into_iter().map(|raw| raw.confirm(&map)).collect())
}

struct Walk<'f, F> {
    visit: &'f mut F,
    error: Option<String>,
    seen: usize,
}

fn for_each_object<F>(mut visit: F) -> Result<(), LookupError>
where
    F: FnMut(RawObject) -> ControlFlow<()>,
{
    unsafe extern "C" fn callback<F>(info: *mut dl_phdr_info, _size: size_t, data: *mut c_void) -> c_int
    where
        F: FnMut(RawObject) -> ControlFlow<()>,
    {
        let walk = &mut *data.cast::<Walk<'_, F>>();
        walk.seen += 1;

        let Some(info) = info.as_ref() else {
            walk.error = Some("loader passed a null dl_phdr_info".to_string());
            return 1;
        };
        match describe(info) {
            Ok(raw) => match (walk.visit)(raw) {
                ControlFlow::Continue(()) => 0,
                ControlFlow::Break(()) => 1,
            },
            Err(message) => {
                walk.error = Some(message);
                1
            }
        }
    }

    let mut walk = Walk { visit: &mut visit, error: None, seen: 0 };
    // SAFETY: `walk` outlives the call and the callback only casts `data`
    // back to the same type
    unsafe {
        libc::dl_iterate_phdr(Some(callback::<F>), std::ptr::addr_of_mut!(walk).cast());
    }

    if let Some(message) = walk.error {
        return Err(LookupError::Enumeration(message));
    }
    if walk.seen == 0 {
        // There is always at least the main program
        return Err(LookupError::Enumeration("dl_iterate_phdr reported no objects".to_string()));
    }
    Ok(())
}

/// Read one loader record into owned data
unsafe fn describe(info: &dl_phdr_info) -> Result<RawObject, String> {
    let path = object_path(info);
    let load_bias = info.dlpi_addr as usize;

    let phnum = usize::from(info.dlpi_phnum);
    if phnum > 0 && info.dlpi_phdr.is_null() {
        return Err(format!("{} has a null program header table", path.display()));
    }
    let phdrs = if phnum == 0 { &[][..] } else { std::slice::from_raw_parts(info.dlpi_phdr, phnum) };

    let mut segments = Vec::new();
    let mut dynamic = None;
    for phdr in phdrs {
        let start = load_bias.wrapping_add(phdr.p_vaddr as usize);
        match phdr.p_type {
            PT_LOAD if phdr.p_flags & PF_R != 0 && phdr.p_memsz > 0 => {
                let end = start.checked_add(phdr.p_memsz as usize).ok_or_else(|| {
                    format!("{} has a PT_LOAD segment wrapping the address space", path.display())
                })?;
                segments.push(MemoryRange { start, end });
            }
            PT_DYNAMIC => dynamic = Some(start),
            _ => {}
        }
    }

    Ok(RawObject { path, load_bias, dynamic, segments })
}

/// The loader reports the main program with an empty name
unsafe fn object_path(info: &dl_phdr_info) -> PathBuf {
    let name = if info.dlpi_name.is_null() { &[][..] } else { CStr::from_ptr(info.dlpi_name).to_bytes() };
    if name.is_empty() {
        std::fs::read_link("/proc/self/exe").unwrap_or_default()
    } else {
        PathBuf::from(OsStr::from_bytes(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmatched_pattern_is_not_found() {
        let err = locate("*realsym-no-such-object-*.so*").unwrap_err();
        assert!(err.is_not_found(), "unexpected error: {err}");
        assert!(matches!(err, LookupError::ObjectNotFound { ref pattern } if pattern == "*realsym-no-such-object-*.so*"));
    }

    #[test]
    fn test_main_program_is_enumerated() {
        let objects = loaded_objects().expect("enumeration should work in tests");
        assert!(!objects.is_empty());

        let exe = std::env::current_exe().unwrap().canonicalize().unwrap();
        let main = objects
            .iter()
            .find(|o| o.path().canonicalize().ok().as_deref() == Some(exe.as_path()))
            .expect("the test binary should be among the loaded objects");
        assert!(!main.segments().is_empty());

        let here = test_main_program_is_enumerated as fn() as usize;
        assert!(main.segments().iter().any(|s| s.contains(here)));
    }

    #[test]
    fn test_located_path_satisfies_pattern() {
        let objects = loaded_objects().unwrap();
        let some_library = objects
            .iter()
            .filter(|o| o.path().is_absolute())
            .filter_map(|o| o.path().file_name())
            .find(|name| name.as_bytes().windows(3).any(|w| w == b".so"))
            .expect("a shared library should be loaded")
            .to_os_string();

        let pattern = format!("*/{}", some_library.to_string_lossy());
        let object = locate(&pattern).unwrap();
        assert!(Pattern::new(&pattern).matches(object.path().as_os_str().as_bytes()));
        assert_eq!(object.base_address(), object.segments()[0].start);
        object.release();
    }

    #[cfg(target_env = "gnu")]
    #[test]
    fn test_locate_libc() {
        let libc = locate("*libc.so*").unwrap();
        assert!(libc.path().to_string_lossy().contains("libc.so"));
        assert!(libc.dynamic_section().is_some());
        assert!(libc.segments().len() >= 2);
        assert!(libc.segments().windows(2).all(|w| w[0].start <= w[1].start));
    }
}
