/*
 *  platform/windows.rs
 *
 *  dynbind - runtime shared-library bindings
 *  (c) 2020-26 Stuart Hunter
 *
 *  Windows loader - LoadLibraryW/GetProcAddress/FreeLibrary
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

use std::ffi::{CString, OsStr, c_void};
use std::os::windows::ffi::OsStrExt;
use std::ptr::{self, NonNull};

use windows_sys::Win32::Foundation::{FreeLibrary, GetLastError, HMODULE};
use windows_sys::Win32::System::Diagnostics::Debug::{
    FORMAT_MESSAGE_FROM_SYSTEM, FORMAT_MESSAGE_IGNORE_INSERTS, FormatMessageW,
};
use windows_sys::Win32::System::LibraryLoader::{GetProcAddress, LoadLibraryW};

use super::{ErrorSource, LibraryHandle, Loader};

/// Characters reserved for a formatted system message
const MESSAGE_CAPACITY: usize = 512;

/// `LoadLibraryW`-based loader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowsLoader;

impl WindowsLoader {
    pub fn new() -> Self {
        Self
    }
}

fn wide_path(path: &str) -> Option<Vec<u16>> {
    let mut wide: Vec<u16> = OsStr::new(path).encode_wide().collect();
    if wide.contains(&0) {
        return None;
    }
    wide.push(0);
    Some(wide)
}

impl ErrorSource for WindowsLoader {
    fn last_platform_error(&self) -> Option<String> {
        let code = unsafe { GetLastError() };
        if code == 0 {
            return None;
        }

        let mut buffer = [0u16; MESSAGE_CAPACITY];
        let len = unsafe {
            FormatMessageW(
                FORMAT_MESSAGE_FROM_SYSTEM | FORMAT_MESSAGE_IGNORE_INSERTS,
                ptr::null(),
                code,
                0,
                buffer.as_mut_ptr(),
                MESSAGE_CAPACITY as u32,
                ptr::null(),
            )
        };
        if len == 0 {
            return None;
        }
        Some(String::from_utf16_lossy(&buffer[..len as usize]))
    }
}

impl Loader for WindowsLoader {
    fn open_library(&self, path: &str) -> Option<LibraryHandle> {
        let wide = wide_path(path)?;
        let module: HMODULE = unsafe { LoadLibraryW(wide.as_ptr()) };
        LibraryHandle::from_raw(module as *mut c_void)
    }

    fn resolve_symbol(&self, handle: LibraryHandle, name: &str) -> Option<NonNull<c_void>> {
        let c_name = CString::new(name).ok()?;
        let proc = unsafe { GetProcAddress(handle.as_ptr() as HMODULE, c_name.as_ptr().cast()) }?;
        NonNull::new(proc as *mut c_void)
    }

    unsafe fn close_library(&self, handle: LibraryHandle) {
        unsafe {
            FreeLibrary(handle.as_ptr() as HMODULE);
        }
    }
}
