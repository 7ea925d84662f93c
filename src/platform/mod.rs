/*
 *  platform/mod.rs
 *
 *  dynbind - runtime shared-library bindings
 *  (c) 2020-26 Stuart Hunter
 *
 *  Platform loader adapter
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

//! Per-OS shared-library primitives.
//!
//! [`Loader`] is the seam between the binding engine and the operating
//! system: open a library, look up a symbol, close the library. Every loader
//! is also an [`ErrorSource`], reporting the loader's most recent failure as
//! the OS currently records it.
//!
//! [`SystemLoader`] is picked at build time: [`PosixLoader`] on unix,
//! [`WindowsLoader`] on Windows. [`MockLoader`] serves tests.

use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;

pub mod mock;
#[cfg(unix)]
pub mod posix;
#[cfg(windows)]
pub mod windows;

pub use mock::MockLoader;
#[cfg(unix)]
pub use posix::PosixLoader;
#[cfg(windows)]
pub use windows::WindowsLoader;

/// The loader for the platform this crate was built for.
#[cfg(unix)]
pub type SystemLoader = PosixLoader;

/// The loader for the platform this crate was built for.
#[cfg(windows)]
pub type SystemLoader = WindowsLoader;

/// Opaque reference to a loaded library image.
///
/// Holding a handle does not keep the library alive; ownership of the
/// OS reference stays with whoever opened it.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct LibraryHandle(NonNull<c_void>);

impl LibraryHandle {
    /// Wrap a raw handle, `None` when null.
    pub fn from_raw(raw: *mut c_void) -> Option<Self> {
        NonNull::new(raw).map(Self)
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }
}

impl fmt::Debug for LibraryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LibraryHandle({:p})", self.0)
    }
}

// A handle is an address the loader hands back; it carries no thread affinity.
unsafe impl Send for LibraryHandle {}
unsafe impl Sync for LibraryHandle {}

/// Source of the platform's most recent dynamic-loading error.
pub trait ErrorSource {
    /// Raw loader message as currently recorded by the OS, `None` when no
    /// error is pending or it cannot be formatted.
    ///
    /// Computed fresh on every call. On POSIX reading the message also
    /// clears it.
    fn last_platform_error(&self) -> Option<String>;
}

/// Open, resolve and close primitives for one platform.
///
/// Failures are reported as `None` and never panic, so callers can move on
/// to the next candidate path.
pub trait Loader: ErrorSource {
    /// Load the library at `path`, taking an OS reference on success.
    fn open_library(&self, path: &str) -> Option<LibraryHandle>;

    /// Look up `name` in the export table of `handle`.
    fn resolve_symbol(&self, handle: LibraryHandle, name: &str) -> Option<NonNull<c_void>>;

    /// Release the OS reference taken by [`Loader::open_library`].
    ///
    /// # Safety
    ///
    /// `handle` must come from `open_library` on this loader and must not
    /// have been closed already. Addresses resolved through it are dangling
    /// afterwards.
    unsafe fn close_library(&self, handle: LibraryHandle);
}
