/*
 *  platform/mock.rs
 *
 *  dynbind - runtime shared-library bindings
 *  (c) 2020-26 Stuart Hunter
 *
 *  In-memory loader for testing without shared libraries
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

use std::collections::HashMap;
use std::ffi::c_void;
use std::ptr::{self, NonNull};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{ErrorSource, LibraryHandle, Loader};

// Fake addresses: handle = (index + 1) << HANDLE_SHIFT, symbols sit just above.
const HANDLE_SHIFT: usize = 12;

/// One loader primitive as seen by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Open(String),
    Resolve(String),
    Close(String),
}

#[derive(Debug, Clone)]
struct MockLibrary {
    path: String,
    symbols: Vec<String>,
}

/// Internal state for the mock loader (shared for inspection in tests)
#[derive(Debug, Default)]
pub struct MockLoaderState {
    libraries: Vec<MockLibrary>,
    references: HashMap<usize, usize>,
    calls: Vec<MockCall>,
    pending_error: Option<String>,
}

/// Loader over an in-memory table of libraries.
///
/// Useful for:
/// - Unit tests of the binding lifecycle
/// - Dry runs of a manifest without the libraries installed
///
/// Errors behave like `dlerror`: every primitive clears the pending message,
/// failures record a new one and reading it clears it. Addresses handed out
/// are fake and must never be dereferenced or called.
#[derive(Debug, Clone, Default)]
pub struct MockLoader {
    state: Arc<Mutex<MockLoaderState>>,
}

impl MockLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `path` openable, exporting `symbols`.
    pub fn with_library(self, path: &str, symbols: &[&str]) -> Self {
        self.lock().libraries.push(MockLibrary {
            path: path.to_string(),
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    /// Every primitive invoked so far, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Outstanding open references for `path`.
    pub fn references(&self, path: &str) -> usize {
        let state = self.lock();
        state
            .libraries
            .iter()
            .position(|lib| lib.path == path)
            .and_then(|index| state.references.get(&index).copied())
            .unwrap_or(0)
    }

    /// Address `resolve_symbol` hands out for `symbol` in `path`.
    pub fn address_of(&self, path: &str, symbol: &str) -> Option<NonNull<c_void>> {
        let state = self.lock();
        let index = state.libraries.iter().position(|lib| lib.path == path)?;
        let offset = state.libraries[index].symbols.iter().position(|s| s == symbol)?;
        NonNull::new(ptr::without_provenance_mut(handle_addr(index) + offset + 1))
    }

    fn lock(&self) -> MutexGuard<'_, MockLoaderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn handle_addr(index: usize) -> usize {
    (index + 1) << HANDLE_SHIFT
}

fn handle_index(handle: LibraryHandle) -> usize {
    (handle.as_ptr().addr() >> HANDLE_SHIFT).saturating_sub(1)
}

impl ErrorSource for MockLoader {
    fn last_platform_error(&self) -> Option<String> {
        self.lock().pending_error.take()
    }
}

impl Loader for MockLoader {
    fn open_library(&self, path: &str) -> Option<LibraryHandle> {
        let mut state = self.lock();
        state.calls.push(MockCall::Open(path.to_string()));
        state.pending_error = None;

        let Some(index) = state.libraries.iter().position(|lib| lib.path == path) else {
            state.pending_error = Some(format!(
                "{path}: cannot open shared object file: No such file or directory"
            ));
            return None;
        };

        *state.references.entry(index).or_insert(0) += 1;
        LibraryHandle::from_raw(ptr::without_provenance_mut(handle_addr(index)))
    }

    fn resolve_symbol(&self, handle: LibraryHandle, name: &str) -> Option<NonNull<c_void>> {
        let mut state = self.lock();
        state.calls.push(MockCall::Resolve(name.to_string()));
        state.pending_error = None;

        let index = handle_index(handle);
        let library = state.libraries.get(index)?;
        match library.symbols.iter().position(|s| s == name) {
            Some(offset) => NonNull::new(ptr::without_provenance_mut(
                handle_addr(index) + offset + 1,
            )),
            None => {
                let message = format!("{}: undefined symbol: {name}", library.path);
                state.pending_error = Some(message);
                None
            }
        }
    }

    unsafe fn close_library(&self, handle: LibraryHandle) {
        let mut state = self.lock();
        state.pending_error = None;

        let index = handle_index(handle);
        let path = state
            .libraries
            .get(index)
            .map(|lib| lib.path.clone())
            .unwrap_or_default();
        state.calls.push(MockCall::Close(path));
        if let Some(count) = state.references.get_mut(&index) {
            *count = count.saturating_sub(1);
        }
    }
}
