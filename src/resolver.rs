/*
 *  resolver.rs
 *
 *  dynbind - runtime shared-library bindings
 *  (c) 2020-26 Stuart Hunter
 *
 *  Symbol resolver - required/optional resolution policy
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

use std::ffi::c_void;
use std::ptr::NonNull;

use crate::descriptor::{Requiredness, SymbolDescriptor};
use crate::platform::{LibraryHandle, Loader};

/// Outcome of resolving one descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Symbol found at this address
    Found(NonNull<c_void>),
    /// Optional symbol absent, slot stays null
    Absent,
    /// Required symbol absent, the open must fail
    Missing,
}

impl Resolution {
    pub fn address(self) -> Option<NonNull<c_void>> {
        match self {
            Resolution::Found(address) => Some(address),
            Resolution::Absent | Resolution::Missing => None,
        }
    }

    pub fn is_fatal(self) -> bool {
        self == Resolution::Missing
    }
}

/// Look up `descriptor.source_name()` in `handle` and apply its policy.
pub fn resolve<L: Loader + ?Sized>(
    loader: &L,
    handle: LibraryHandle,
    descriptor: &SymbolDescriptor,
) -> Resolution {
    match loader.resolve_symbol(handle, descriptor.source_name()) {
        Some(address) => {
            bind_log!(
                debug,
                "resolved {} ({}) at {:p}",
                descriptor.bound_name(),
                descriptor.source_name(),
                address
            );
            Resolution::Found(address)
        }
        None => match descriptor.requiredness() {
            Requiredness::Optional => {
                bind_log!(
                    debug,
                    "optional symbol {} ({}) not found",
                    descriptor.bound_name(),
                    descriptor.source_name()
                );
                Resolution::Absent
            }
            Requiredness::Required => {
                bind_log!(
                    warn,
                    "required symbol {} ({}) not found",
                    descriptor.bound_name(),
                    descriptor.source_name()
                );
                Resolution::Missing
            }
        },
    }
}
