/*
 *  lib.rs
 *
 *  dynbind - runtime shared-library bindings
 *  (c) 2020-26 Stuart Hunter
 *
 *  Runtime binding of shared-library symbols
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

//! # dynbind
//!
//! Declare, ahead of time, the functions and global variables a program needs
//! from a shared library, then bind them at runtime.
//!
//! A [`Binding`] owns one library handle and one pointer slot per declared
//! [`SymbolDescriptor`]. Opening a binding walks its [`CandidatePaths`] in
//! order, opens the first library that loads and resolves every descriptor:
//!
//! - **Required** symbols must resolve, otherwise the whole open fails and the
//!   binding is rolled back to closed.
//! - **Optional** symbols that are absent leave a null slot.
//!
//! ```no_run
//! use dynbind::{Binding, BindingSpec, SymbolDescriptor};
//!
//! let spec = BindingSpec::builder("libm")
//!     .candidate("libm.so")
//!     .candidate("libm.so.6")
//!     .symbol(SymbolDescriptor::function("cbrt"))
//!     .symbol(SymbolDescriptor::function("sqrt").optional())
//!     .build()?;
//!
//! let mut libm = Binding::new(spec);
//! if !libm.open() {
//!     eprintln!("libm: {}", libm.last_error());
//!     return Ok(());
//! }
//!
//! let cbrt = unsafe { libm.function::<extern "C" fn(f64) -> f64>("cbrt") };
//! assert_eq!(cbrt.map(|f| (*f)(27.0)), Some(3.0));
//! # Ok::<(), dynbind::SpecError>(())
//! ```
//!
//! ## Platform support
//!
//! - POSIX: `dlopen`/`dlsym`/`dlclose`, errors from `dlerror`
//! - Windows: `LoadLibraryW`/`GetProcAddress`/`FreeLibrary`, errors from
//!   `GetLastError` formatted with `FormatMessageW`
//!
//! ## Diagnostics
//!
//! Build with the `debug-logging` feature to have load, resolve and close
//! events reported through the `log` facade under the `dynbind` target.

#[macro_use]
mod macros;

pub mod binding;
pub mod candidates;
pub mod descriptor;
pub mod error;
pub mod manifest;
pub mod platform;
pub mod reporter;
pub mod resolver;

pub use binding::{Binding, BindingSpec, BindingSpecBuilder, Symbol, SymbolStatus};
pub use candidates::CandidatePaths;
pub use descriptor::{Requiredness, SymbolDescriptor, SymbolKind};
pub use error::{BindError, SpecError};
pub use manifest::{BindingEntry, Manifest, ManifestError, SymbolEntry};
pub use platform::{ErrorSource, LibraryHandle, Loader, SystemLoader};
