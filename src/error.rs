/*
 *  error.rs
 *
 *  dynbind - runtime shared-library bindings
 *  (c) 2020-26 Stuart Hunter
 *
 *  Error types for binding construction and lifecycle
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

use thiserror::Error;

/// Rejected while building a [`BindingSpec`](crate::BindingSpec).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    #[error("binding name must not be empty")]
    EmptyBindingName,
    #[error("no candidate library paths given")]
    NoCandidates,
    #[error("candidate library path must not be empty")]
    EmptyCandidate,
    #[error("{0:?} contains a NUL byte")]
    InteriorNul(String),
    #[error("symbol bound name must not be empty")]
    EmptyBoundName,
    #[error("symbol '{0}' has an empty source name")]
    EmptySourceName(String),
    #[error("symbol '{0}' is a variable and cannot be variadic")]
    VariadicVariable(String),
    #[error("symbol '{0}' is declared more than once")]
    DuplicateSymbol(String),
}

/// Why an open attempt failed.
///
/// Carries the failure kind only. The loader's own message is read
/// separately through [`Binding::last_error`](crate::Binding::last_error).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    #[error("{binding}: no library could be opened from {candidates:?}")]
    LibraryNotFound {
        binding: String,
        candidates: Vec<String>,
    },
    #[error("{binding}: required symbol '{bound_name}' ('{source_name}') not found")]
    MissingSymbol {
        binding: String,
        bound_name: String,
        source_name: String,
    },
}
