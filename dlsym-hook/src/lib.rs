//! # dlsym-hook
//!
//! `LD_PRELOAD` library that replaces `dlsym` so buffer-swap entry points can
//! be wrapped even in applications that load GL through `dlopen`/`dlsym`.
//!
//! ```text
//! app ──dlsym("glXSwapBuffers")──▶ hook dlsym ──▶ real dlsym (via realsym)
//!                                      │
//!                                      └─ remember real pointer, hand back wrapper
//! app ──glXSwapBuffers(dpy, d)──▶ wrapper ──▶ count frame ──▶ real glXSwapBuffers
//! ```
//!
//! The real `dlsym` cannot be looked up with `dlsym`, so it comes from
//! [`realsym::call_real_dlsym`]. If it cannot be found the process exits with
//! status 69.
//!
//! Set `RUST_LOG=dlsym_hook=debug` to see every redirect and frame.

#![allow(unsafe_code)] // every export here is an FFI entry point
#![allow(clippy::missing_safety_doc)] // the contracts are those of the C functions

use libc::{c_char, c_uint, c_void};
use log::{debug, info, warn};
use realsym::call_real_dlsym;
use std::ffi::CStr;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, Ordering};

type GlxSwapBuffersFn = unsafe extern "C" fn(*mut c_void, *mut c_void);
type EglSwapBuffersFn = unsafe extern "C" fn(*mut c_void, *mut c_void) -> c_uint;
type GetProcAddressFn = unsafe extern "C" fn(*const u8) -> *mut c_void;

static LOGGING: AtomicBool = AtomicBool::new(false);
static FRAMES: AtomicU64 = AtomicU64::new(0);

/// An intercepted function and the real implementation behind it
struct Hooked {
    name: &'static CStr,
    real: AtomicPtr<c_void>,
}

static GLX_SWAP_BUFFERS: Hooked = Hooked::new(c"glXSwapBuffers");
static EGL_SWAP_BUFFERS: Hooked = Hooked::new(c"eglSwapBuffers");
static GLX_GET_PROC_ADDRESS: Hooked = Hooked::new(c"glXGetProcAddress");
static GLX_GET_PROC_ADDRESS_ARB: Hooked = Hooked::new(c"glXGetProcAddressARB");

impl Hooked {
    const fn new(name: &'static CStr) -> Self {
        Self { name, real: AtomicPtr::new(ptr::null_mut()) }
    }

    /// Store the implementation the application asked for, unless it is
    /// this library's own export (which would loop)
    fn remember(&self, real: *mut c_void, own_export: Option<*mut c_void>) {
        if real.is_null() || Some(real) == own_export {
            return;
        }
        self.real.store(real, Ordering::Release);
    }

    /// The remembered implementation, or the next definition after this library
    fn get(&self) -> *mut c_void {
        let real = self.real.load(Ordering::Acquire);
        if !real.is_null() {
            return real;
        }
        // SAFETY: `name` is a valid C string and RTLD_NEXT a valid pseudo-handle
        let next = unsafe { call_real_dlsym(libc::RTLD_NEXT, self.name.as_ptr()) };
        if next.is_null() {
            warn!("No implementation of {} after dlsym-hook", self.name.to_string_lossy());
        } else {
            self.real.store(next, Ordering::Release);
        }
        next
    }
}

fn init_logging() {
    // A host that already installed a logger keeps it
    if !LOGGING.swap(true, Ordering::Relaxed) {
        let _ = env_logger::try_init();
    }
}

fn count_frame(api: &str) {
    let frame = FRAMES.fetch_add(1, Ordering::Relaxed) + 1;
    debug!("{api}: frame {frame}");
}

/// Frames presented through any wrapped swap function so far
#[must_use]
pub fn frames() -> u64 {
    FRAMES.load(Ordering::Relaxed)
}

/// The wrapper to hand out instead of `real` for `name`, if `name` is wrapped
fn redirect(name: &[u8], real: *mut c_void) -> Option<*mut c_void> {
    let (hooked, wrapper, own_export): (&Hooked, *mut c_void, Option<*mut c_void>) = match name {
        b"glXSwapBuffers" => (
            &GLX_SWAP_BUFFERS,
            glx_swap_buffers_hook as GlxSwapBuffersFn as *mut c_void,
            Some(glXSwapBuffers as GlxSwapBuffersFn as *mut c_void),
        ),
        b"eglSwapBuffers" => (
            &EGL_SWAP_BUFFERS,
            egl_swap_buffers_hook as EglSwapBuffersFn as *mut c_void,
            Some(eglSwapBuffers as EglSwapBuffersFn as *mut c_void),
        ),
        b"glXGetProcAddress" => {
            (&GLX_GET_PROC_ADDRESS, glx_get_proc_address_hook as GetProcAddressFn as *mut c_void, None)
        }
        b"glXGetProcAddressARB" => (
            &GLX_GET_PROC_ADDRESS_ARB,
            glx_get_proc_address_arb_hook as GetProcAddressFn as *mut c_void,
            None,
        ),
        _ => return None,
    };

    hooked.remember(real, own_export);
    info!("Redirecting {} ({real:p} -> {wrapper:p})", hooked.name.to_string_lossy());
    Some(wrapper)
}

/// Replacement for `dlsym(3)`
#[no_mangle]
pub unsafe extern "C" fn dlsym(handle: *mut c_void, symbol: *const c_char) -> *mut c_void {
    init_logging();

    let real = call_real_dlsym(handle, symbol);
    if real.is_null() || symbol.is_null() {
        return real;
    }
    redirect(CStr::from_ptr(symbol).to_bytes(), real).unwrap_or(real)
}

unsafe extern "C" fn glx_swap_buffers_hook(display: *mut c_void, drawable: *mut c_void) {
    count_frame("glXSwapBuffers");
    let real = GLX_SWAP_BUFFERS.get();
    if !real.is_null() {
        let real: GlxSwapBuffersFn = std::mem::transmute(real);
        real(display, drawable);
    }
}

unsafe extern "C" fn egl_swap_buffers_hook(display: *mut c_void, surface: *mut c_void) -> c_uint {
    count_frame("eglSwapBuffers");
    let real = EGL_SWAP_BUFFERS.get();
    if real.is_null() {
        return 0; // EGL_FALSE
    }
    let real: EglSwapBuffersFn = std::mem::transmute(real);
    real(display, surface)
}

unsafe fn get_proc_address(hooked: &Hooked, name: *const u8) -> *mut c_void {
    let real = hooked.get();
    if real.is_null() {
        return ptr::null_mut();
    }
    let real: GetProcAddressFn = std::mem::transmute(real);
    let found = real(name);
    if found.is_null() || name.is_null() {
        return found;
    }
    match CStr::from_ptr(name.cast()).to_bytes() {
        b"glXSwapBuffers" => redirect(b"glXSwapBuffers", found).unwrap_or(found),
        _ => found,
    }
}

unsafe extern "C" fn glx_get_proc_address_hook(name: *const u8) -> *mut c_void {
    get_proc_address(&GLX_GET_PROC_ADDRESS, name)
}

unsafe extern "C" fn glx_get_proc_address_arb_hook(name: *const u8) -> *mut c_void {
    get_proc_address(&GLX_GET_PROC_ADDRESS_ARB, name)
}

/// For applications linked against libGL directly
#[no_mangle]
#[allow(non_snake_case)]
pub unsafe extern "C" fn glXSwapBuffers(display: *mut c_void, drawable: *mut c_void) {
    init_logging();
    glx_swap_buffers_hook(display, drawable);
}

/// For applications linked against libEGL directly
#[no_mangle]
#[allow(non_snake_case)]
pub unsafe extern "C" fn eglSwapBuffers(display: *mut c_void, surface: *mut c_void) -> c_uint {
    init_logging();
    egl_swap_buffers_hook(display, surface)
}
