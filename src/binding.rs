/*
 *  binding.rs
 *
 *  dynbind - runtime shared-library bindings
 *  (c) 2020-26 Stuart Hunter
 *
 *  Binding lifecycle controller
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

use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::ffi::c_void;
use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ops::Deref;
use std::ptr::NonNull;

use crate::candidates::CandidatePaths;
use crate::descriptor::{SymbolDescriptor, SymbolKind};
use crate::error::{BindError, SpecError};
use crate::platform::{LibraryHandle, Loader, SystemLoader};
use crate::reporter;
use crate::resolver;

/// Everything needed to bind one library: a name, where to look and what to
/// resolve. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingSpec {
    name: String,
    candidates: CandidatePaths,
    symbols: Vec<SymbolDescriptor>,
}

impl BindingSpec {
    pub fn new(
        name: impl Into<String>,
        candidates: CandidatePaths,
        symbols: Vec<SymbolDescriptor>,
    ) -> Result<Self, SpecError> {
        let name = name.into();
        if name.is_empty() {
            return Err(SpecError::EmptyBindingName);
        }

        let mut seen = HashSet::with_capacity(symbols.len());
        for descriptor in &symbols {
            descriptor.validate()?;
            if !seen.insert(descriptor.bound_name()) {
                return Err(SpecError::DuplicateSymbol(descriptor.bound_name().to_string()));
            }
        }

        Ok(Self {
            name,
            candidates,
            symbols,
        })
    }

    pub fn builder(name: impl Into<String>) -> BindingSpecBuilder {
        BindingSpecBuilder {
            name: name.into(),
            candidates: Vec::new(),
            env_override: None,
            symbols: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn candidates(&self) -> &CandidatePaths {
        &self.candidates
    }

    /// Descriptors in declared order.
    pub fn symbols(&self) -> &[SymbolDescriptor] {
        &self.symbols
    }

    pub fn descriptor(&self, bound_name: &str) -> Option<&SymbolDescriptor> {
        self.symbols.iter().find(|d| d.bound_name() == bound_name)
    }
}

/// Accumulates a [`BindingSpec`]; validation happens in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct BindingSpecBuilder {
    name: String,
    candidates: Vec<String>,
    env_override: Option<String>,
    symbols: Vec<SymbolDescriptor>,
}

impl BindingSpecBuilder {
    pub fn candidate(mut self, path: impl Into<String>) -> Self {
        self.candidates.push(path.into());
        self
    }

    pub fn candidates<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.candidates.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Environment variable whose value is tried before the candidates.
    pub fn env_override(mut self, var: impl Into<String>) -> Self {
        self.env_override = Some(var.into());
        self
    }

    pub fn symbol(mut self, descriptor: SymbolDescriptor) -> Self {
        self.symbols.push(descriptor);
        self
    }

    pub fn symbols(mut self, descriptors: impl IntoIterator<Item = SymbolDescriptor>) -> Self {
        self.symbols.extend(descriptors);
        self
    }

    pub fn build(self) -> Result<BindingSpec, SpecError> {
        let mut candidates = CandidatePaths::new(self.candidates)?;
        if let Some(var) = self.env_override.as_deref() {
            candidates = candidates.with_env_override(var);
        }
        BindingSpec::new(self.name, candidates, self.symbols)
    }
}

/// Borrowed view of a resolved symbol.
///
/// Ties the value to the [`Binding`] it came from, so the binding cannot be
/// closed or dropped while the view is alive.
pub struct Symbol<'lib, T> {
    value: T,
    _binding: PhantomData<&'lib ()>,
}

impl<T> Deref for Symbol<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: fmt::Debug> fmt::Debug for Symbol<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Symbol").field(&self.value).finish()
    }
}

/// One descriptor and the current content of its slot.
#[derive(Debug, Clone, Copy)]
pub struct SymbolStatus<'a> {
    pub descriptor: &'a SymbolDescriptor,
    pub address: Option<NonNull<c_void>>,
}

impl SymbolStatus<'_> {
    pub fn is_resolved(&self) -> bool {
        self.address.is_some()
    }
}

/// A library handle paired with its resolved symbol table.
///
/// Starts closed. [`open`](Self::open) searches the candidates and resolves
/// every descriptor; [`close`](Self::close) nulls every slot and releases the
/// library. Both are idempotent. Dropping the binding closes it.
///
/// Addresses handed out point into the loaded image and are only valid
/// while the binding stays open.
pub struct Binding<L: Loader = SystemLoader> {
    spec: BindingSpec,
    loader: L,
    handle: Option<LibraryHandle>,
    opened_from: Option<usize>,
    slots: Vec<Option<NonNull<c_void>>>,
    index: HashMap<String, usize>,
    // loader text saved before a rollback close could clobber it
    deferred_error: Cell<Option<String>>,
}

// Slots point into a process-wide library image; only the owner mutates them.
unsafe impl<L: Loader + Send> Send for Binding<L> {}

impl Binding<SystemLoader> {
    pub fn new(spec: BindingSpec) -> Self {
        Self::with_loader(spec, SystemLoader::default())
    }
}

impl<L: Loader> Binding<L> {
    pub fn with_loader(spec: BindingSpec, loader: L) -> Self {
        let index = spec
            .symbols
            .iter()
            .enumerate()
            .map(|(slot, d)| (d.bound_name().to_string(), slot))
            .collect();

        Self {
            slots: vec![None; spec.symbols.len()],
            spec,
            loader,
            handle: None,
            opened_from: None,
            index,
            deferred_error: Cell::new(None),
        }
    }

    /// Open the library and resolve every symbol.
    ///
    /// Returns `true` when open. Details of a failure come from
    /// [`last_error`](Self::last_error), read straight afterwards.
    pub fn open(&mut self) -> bool {
        self.try_open().is_ok()
    }

    /// [`open`](Self::open), reporting which way it failed.
    ///
    /// Already open is success with no new search or resolution. When a
    /// required symbol is missing the binding is rolled back: every slot is
    /// nulled and the library released before returning.
    pub fn try_open(&mut self) -> Result<(), BindError> {
        if self.handle.is_some() {
            return Ok(());
        }
        self.deferred_error.set(None);

        let Some((position, handle)) = self.spec.candidates.search(&self.loader) else {
            return Err(BindError::LibraryNotFound {
                binding: self.spec.name.clone(),
                candidates: self.spec.candidates.paths().to_vec(),
            });
        };

        let loader = &self.loader;
        let missing = self
            .spec
            .symbols
            .iter()
            .zip(self.slots.iter_mut())
            .find_map(|(descriptor, slot)| {
                let resolution = resolver::resolve(loader, handle, descriptor);
                *slot = resolution.address();
                resolution.is_fatal().then_some(descriptor)
            });

        if let Some(descriptor) = missing {
            let error = BindError::MissingSymbol {
                binding: self.spec.name.clone(),
                bound_name: descriptor.bound_name().to_string(),
                source_name: descriptor.source_name().to_string(),
            };

            let pending = self.loader.last_platform_error();
            self.slots.fill(None);
            unsafe { self.loader.close_library(handle) };
            self.deferred_error.set(pending);

            bind_log!(warn, "{}", error);
            return Err(error);
        }

        self.handle = Some(handle);
        self.opened_from = Some(position);
        bind_log!(
            info,
            "{}: bound {} of {} symbols from {}",
            self.spec.name,
            self.slots.iter().filter(|slot| slot.is_some()).count(),
            self.slots.len(),
            self.spec.candidates.paths()[position]
        );
        Ok(())
    }

    /// Null every slot and release the library. No-op when closed.
    pub fn close(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.deferred_error.set(None);

        self.slots.fill(None);
        self.opened_from = None;
        unsafe { self.loader.close_library(handle) };
        bind_log!(info, "{}: closed", self.spec.name);
    }

    /// The platform's current dynamic-loading error, or an empty string.
    ///
    /// Reflects OS state at call time rather than a snapshot, so it must be
    /// read on the failing thread before any other loader call. The one
    /// exception is a rolled-back open: the resolver's message is kept and
    /// returned by the next call.
    pub fn last_error(&self) -> String {
        match self.deferred_error.take() {
            Some(message) => reporter::normalize(&message).to_string(),
            None => reporter::last_error(&self.loader),
        }
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &BindingSpec {
        &self.spec
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Candidate the library was opened from.
    pub fn library_path(&self) -> Option<&str> {
        self.opened_from
            .map(|position| self.spec.candidates.paths()[position].as_str())
    }

    /// Raw slot for `bound_name`; `None` when closed, absent or undeclared.
    pub fn symbol(&self, bound_name: &str) -> Option<NonNull<c_void>> {
        self.index.get(bound_name).and_then(|&slot| self.slots[slot])
    }

    pub fn is_resolved(&self, bound_name: &str) -> bool {
        self.symbol(bound_name).is_some()
    }

    /// Resolved function `bound_name` as the fn-pointer type `F`.
    ///
    /// `None` when unresolved or declared as a variable.
    ///
    /// # Safety
    ///
    /// `F` must match the exported function's real signature and calling
    /// convention, including `...` for descriptors marked variadic.
    pub unsafe fn function<F: Copy>(&self, bound_name: &str) -> Option<Symbol<'_, F>> {
        const {
            assert!(
                mem::size_of::<F>() == mem::size_of::<*mut c_void>(),
                "function symbols must be read as pointer-sized fn types"
            )
        };

        let address = self.typed_slot(bound_name, SymbolKind::Function)?;
        let value = unsafe { mem::transmute_copy::<*mut c_void, F>(&address.as_ptr()) };
        Some(self.view(value))
    }

    /// Address of global variable `bound_name` typed as `T`.
    ///
    /// `None` when unresolved or declared as a function. Reading or writing
    /// through the pointer is up to the caller.
    pub fn variable<T>(&self, bound_name: &str) -> Option<Symbol<'_, NonNull<T>>> {
        let address = self.typed_slot(bound_name, SymbolKind::Variable)?;
        Some(self.view(address.cast::<T>()))
    }

    /// Declared symbols with their current slots, in declared order.
    pub fn symbols(&self) -> impl Iterator<Item = SymbolStatus<'_>> {
        self.spec
            .symbols
            .iter()
            .zip(&self.slots)
            .map(|(descriptor, &address)| SymbolStatus { descriptor, address })
    }

    fn typed_slot(&self, bound_name: &str, kind: SymbolKind) -> Option<NonNull<c_void>> {
        let &slot = self.index.get(bound_name)?;
        if self.spec.symbols[slot].kind() != kind {
            return None;
        }
        self.slots[slot]
    }

    fn view<T>(&self, value: T) -> Symbol<'_, T> {
        Symbol {
            value,
            _binding: PhantomData,
        }
    }
}

impl<L: Loader> Drop for Binding<L> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<L: Loader> fmt::Debug for Binding<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("name", &self.spec.name)
            .field("library", &self.library_path())
            .field("handle", &self.handle)
            .field("symbols", &self.spec.symbols.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::{MockCall, MockLoader};

    type UnaryF64 = extern "C" fn(f64) -> f64;

    fn libmath_spec() -> BindingSpec {
        BindingSpec::builder("libmath")
            .candidates(["libmath.so", "libmath.so.6"])
            .symbol(SymbolDescriptor::function("cbrt"))
            .symbol(SymbolDescriptor::function("sqrt").optional())
            .build()
            .unwrap()
    }

    fn binding(loader: &MockLoader) -> Binding<MockLoader> {
        Binding::with_loader(libmath_spec(), loader.clone())
    }

    #[test]
    fn test_starts_closed() {
        let loader = MockLoader::new().with_library("libmath.so.6", &["cbrt", "sqrt"]);
        let libmath = binding(&loader);
        assert!(!libmath.is_open());
        assert!(libmath.symbols().all(|s| !s.is_resolved()));
        assert!(loader.calls().is_empty());
    }

    #[test]
    fn test_no_candidate_opens() {
        let loader = MockLoader::new();
        let mut libmath = binding(&loader);

        assert!(!libmath.open());
        assert!(!libmath.is_open());
        assert!(!libmath.last_error().is_empty());
        assert_eq!(libmath.symbol("cbrt"), None);
        assert_eq!(libmath.symbol("sqrt"), None);
        assert_eq!(
            loader.calls(),
            vec![
                MockCall::Open("libmath.so".into()),
                MockCall::Open("libmath.so.6".into()),
            ]
        );
    }

    #[test]
    fn test_opens_fallback_and_resolves_all() {
        let loader = MockLoader::new().with_library("libmath.so.6", &["cbrt", "sqrt"]);
        let mut libmath = binding(&loader);

        assert!(libmath.open());
        assert!(libmath.is_open());
        assert_eq!(libmath.library_path(), Some("libmath.so.6"));
        assert_eq!(libmath.symbol("cbrt"), loader.address_of("libmath.so.6", "cbrt"));
        assert_eq!(libmath.symbol("sqrt"), loader.address_of("libmath.so.6", "sqrt"));
        assert!(unsafe { libmath.function::<UnaryF64>("cbrt") }.is_some());
    }

    #[test]
    fn test_optional_absent_still_opens() {
        let loader = MockLoader::new().with_library("libmath.so", &["cbrt"]);
        let mut libmath = binding(&loader);

        assert!(libmath.open());
        assert!(libmath.is_resolved("cbrt"));
        assert!(!libmath.is_resolved("sqrt"));
        assert!(unsafe { libmath.function::<UnaryF64>("sqrt") }.is_none());
    }

    #[test]
    fn test_required_missing_rolls_back() {
        // sqrt declared first so it is resolved before cbrt fails
        let spec = BindingSpec::builder("libmath")
            .candidates(["libmath.so", "libmath.so.6"])
            .symbol(SymbolDescriptor::function("sqrt").optional())
            .symbol(SymbolDescriptor::function("cbrt"))
            .symbol(SymbolDescriptor::function("hypot"))
            .build()
            .unwrap();
        let loader = MockLoader::new().with_library("libmath.so.6", &["sqrt", "hypot"]);
        let mut libmath = Binding::with_loader(spec, loader.clone());

        assert_eq!(
            libmath.try_open(),
            Err(BindError::MissingSymbol {
                binding: "libmath".into(),
                bound_name: "cbrt".into(),
                source_name: "cbrt".into(),
            })
        );
        assert!(!libmath.is_open());
        assert!(libmath.symbols().all(|s| !s.is_resolved()));
        assert_eq!(loader.references("libmath.so.6"), 0);
        assert_eq!(libmath.library_path(), None);

        // hypot is never looked up once cbrt fails
        assert!(!loader.calls().contains(&MockCall::Resolve("hypot".into())));
        assert_eq!(loader.calls().last(), Some(&MockCall::Close("libmath.so.6".into())));
    }

    #[test]
    fn test_rolled_back_error_survives_close() {
        let loader = MockLoader::new().with_library("libmath.so", &["sqrt"]);
        let mut libmath = binding(&loader);

        assert!(!libmath.open());
        let message = libmath.last_error();
        assert!(message.contains("undefined symbol: cbrt"), "{message}");
        // served once, then live state again
        assert_eq!(libmath.last_error(), "");
    }

    #[test]
    fn test_close_while_closed_keeps_rolled_back_error() {
        let loader = MockLoader::new().with_library("libmath.so", &["sqrt"]);
        let mut libmath = binding(&loader);

        assert!(!libmath.open());
        libmath.close();
        let message = libmath.last_error();
        assert!(message.contains("undefined symbol: cbrt"), "{message}");
    }

    #[test]
    fn test_reopen_after_partial_failure_searches_again() {
        let loader = MockLoader::new().with_library("libmath.so", &["sqrt"]);
        let mut libmath = binding(&loader);

        assert!(!libmath.open());
        loader.clear_calls();
        assert!(!libmath.open());
        assert!(loader.calls().contains(&MockCall::Open("libmath.so".into())));
    }

    #[test]
    fn test_open_is_idempotent() {
        let loader = MockLoader::new().with_library("libmath.so", &["cbrt", "sqrt"]);
        let mut libmath = binding(&loader);

        assert!(libmath.open());
        loader.clear_calls();
        assert!(libmath.open());
        assert!(libmath.try_open().is_ok());
        assert!(loader.calls().is_empty());
        assert_eq!(loader.references("libmath.so"), 1);
    }

    #[test]
    fn test_close_twice() {
        let loader = MockLoader::new().with_library("libmath.so", &["cbrt", "sqrt"]);
        let mut libmath = binding(&loader);

        assert!(libmath.open());
        libmath.close();
        libmath.close();
        assert!(!libmath.is_open());
        assert!(libmath.symbols().all(|s| !s.is_resolved()));
        assert_eq!(loader.references("libmath.so"), 0);
        let closes = loader
            .calls()
            .iter()
            .filter(|c| matches!(c, MockCall::Close(_)))
            .count();
        assert_eq!(closes, 1);
    }

    #[test]
    fn test_close_after_failed_open() {
        let loader = MockLoader::new();
        let mut libmath = binding(&loader);

        assert!(!libmath.open());
        libmath.close();
        assert!(!loader.calls().iter().any(|c| matches!(c, MockCall::Close(_))));
    }

    #[test]
    fn test_open_close_open_resolves_again() {
        let loader = MockLoader::new().with_library("libmath.so", &["cbrt", "sqrt"]);
        let mut libmath = binding(&loader);

        assert!(libmath.open());
        libmath.close();
        loader.clear_calls();

        assert!(libmath.open());
        assert!(libmath.is_resolved("cbrt"));
        assert!(libmath.is_resolved("sqrt"));
        assert_eq!(
            loader.calls(),
            vec![
                MockCall::Open("libmath.so".into()),
                MockCall::Resolve("cbrt".into()),
                MockCall::Resolve("sqrt".into()),
            ]
        );
    }

    #[test]
    fn test_source_name_override() {
        let spec = BindingSpec::builder("libmath")
            .candidate("libmath.so")
            .symbol(SymbolDescriptor::function("sqrt2").source("sqrtf"))
            .build()
            .unwrap();
        let loader = MockLoader::new().with_library("libmath.so", &["sqrtf"]);
        let mut libmath = Binding::with_loader(spec, loader.clone());

        assert!(libmath.open());
        assert_eq!(libmath.symbol("sqrt2"), loader.address_of("libmath.so", "sqrtf"));
        assert_eq!(libmath.symbol("sqrtf"), None);
        assert!(loader.calls().contains(&MockCall::Resolve("sqrtf".into())));
    }

    #[test]
    fn test_kind_checked_accessors() {
        let spec = BindingSpec::builder("libc")
            .candidate("libc.so.6")
            .symbol(SymbolDescriptor::variable("environ"))
            .symbol(SymbolDescriptor::function("printf").variadic())
            .build()
            .unwrap();
        let loader = MockLoader::new().with_library("libc.so.6", &["environ", "printf"]);
        let mut c_lib = Binding::with_loader(spec, loader.clone());

        assert!(c_lib.open());
        let environ = c_lib.variable::<*mut *mut u8>("environ");
        assert_eq!(
            environ.map(|v| v.cast::<c_void>()),
            loader.address_of("libc.so.6", "environ")
        );
        assert!(c_lib.variable::<u8>("printf").is_none());
        assert!(unsafe { c_lib.function::<UnaryF64>("environ") }.is_none());
        assert!(unsafe { c_lib.function::<UnaryF64>("undeclared") }.is_none());
    }

    #[test]
    fn test_drop_releases_library() {
        let loader = MockLoader::new().with_library("libmath.so", &["cbrt"]);
        {
            let mut libmath = binding(&loader);
            assert!(libmath.open());
            assert_eq!(loader.references("libmath.so"), 1);
        }
        assert_eq!(loader.references("libmath.so"), 0);
    }

    #[test]
    fn test_library_not_found_error() {
        let loader = MockLoader::new();
        let mut libmath = binding(&loader);
        assert_eq!(
            libmath.try_open(),
            Err(BindError::LibraryNotFound {
                binding: "libmath".into(),
                candidates: vec!["libmath.so".into(), "libmath.so.6".into()],
            })
        );
    }

    #[test]
    fn test_spec_validation() {
        let duplicate = BindingSpec::builder("libmath")
            .candidate("libmath.so")
            .symbol(SymbolDescriptor::function("cbrt"))
            .symbol(SymbolDescriptor::function("cbrt").source("cbrtf"))
            .build();
        assert_eq!(duplicate, Err(SpecError::DuplicateSymbol("cbrt".into())));

        let unnamed = BindingSpec::builder("").candidate("libmath.so").build();
        assert_eq!(unnamed, Err(SpecError::EmptyBindingName));

        let nowhere = BindingSpec::builder("libmath").build();
        assert_eq!(nowhere, Err(SpecError::NoCandidates));

        let nul_path = BindingSpec::builder("libmath").candidate("lib\0m.so").build();
        assert_eq!(nul_path, Err(SpecError::InteriorNul("lib\0m.so".into())));

        let variadic_var = BindingSpec::builder("libc")
            .candidate("libc.so.6")
            .symbol(SymbolDescriptor::variable("environ").variadic())
            .build();
        assert_eq!(variadic_var, Err(SpecError::VariadicVariable("environ".into())));
    }
}
