/*
 *  platform/posix.rs
 *
 *  dynbind - runtime shared-library bindings
 *  (c) 2020-26 Stuart Hunter
 *
 *  POSIX loader - dlopen/dlsym/dlclose/dlerror
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

use std::ffi::{CStr, CString, c_int, c_void};
use std::ptr::NonNull;

use super::{ErrorSource, LibraryHandle, Loader};

/// `dlopen`-based loader.
///
/// Opens with `RTLD_NOW | RTLD_LOCAL` unless told otherwise, so missing
/// dependencies surface at open time rather than on first call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PosixLoader {
    flags: c_int,
}

impl Default for PosixLoader {
    fn default() -> Self {
        Self {
            flags: libc::RTLD_NOW | libc::RTLD_LOCAL,
        }
    }
}

impl PosixLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the binding mode and symbol visibility passed to `dlopen`.
    pub fn with_mode(lazy: bool, global: bool) -> Self {
        let binding = if lazy { libc::RTLD_LAZY } else { libc::RTLD_NOW };
        let visibility = if global { libc::RTLD_GLOBAL } else { libc::RTLD_LOCAL };
        Self {
            flags: binding | visibility,
        }
    }

    pub fn flags(&self) -> c_int {
        self.flags
    }
}

impl ErrorSource for PosixLoader {
    fn last_platform_error(&self) -> Option<String> {
        // dlerror hands back thread-local storage owned by the dynamic linker
        let message = unsafe { libc::dlerror() };
        if message.is_null() {
            return None;
        }
        let text = unsafe { CStr::from_ptr(message) };
        Some(text.to_string_lossy().into_owned())
    }
}

impl Loader for PosixLoader {
    fn open_library(&self, path: &str) -> Option<LibraryHandle> {
        // an interior NUL can never name a file
        let c_path = CString::new(path).ok()?;
        let raw = unsafe { libc::dlopen(c_path.as_ptr(), self.flags) };
        LibraryHandle::from_raw(raw)
    }

    fn resolve_symbol(&self, handle: LibraryHandle, name: &str) -> Option<NonNull<c_void>> {
        let c_name = CString::new(name).ok()?;
        let raw = unsafe { libc::dlsym(handle.as_ptr(), c_name.as_ptr()) };
        NonNull::new(raw)
    }

    unsafe fn close_library(&self, handle: LibraryHandle) {
        unsafe {
            libc::dlclose(handle.as_ptr());
        }
    }
}
