/*
 *  descriptor.rs
 *
 *  dynbind - runtime shared-library bindings
 *  (c) 2020-26 Stuart Hunter
 *
 *  Symbol descriptors - what to resolve and how strictly
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

use serde::{Deserialize, Serialize};

use crate::error::SpecError;

/// What a symbol names inside the library image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    #[default]
    Function,
    Variable,
}

/// Resolution policy for a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Requiredness {
    /// Absence fails the whole open
    #[default]
    Required,
    /// Absence leaves a null slot
    Optional,
}

/// One function or variable to resolve from a library.
///
/// Built with [`SymbolDescriptor::function`] or [`SymbolDescriptor::variable`]
/// and refined with the chaining setters:
///
/// ```
/// use dynbind::{Requiredness, SymbolDescriptor};
///
/// let sqrt2 = SymbolDescriptor::function("sqrt2").source("sqrtf").optional();
/// assert_eq!(sqrt2.bound_name(), "sqrt2");
/// assert_eq!(sqrt2.source_name(), "sqrtf");
/// assert_eq!(sqrt2.requiredness(), Requiredness::Optional);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolDescriptor {
    bound_name: String,
    source_name: String,
    kind: SymbolKind,
    requiredness: Requiredness,
    variadic: bool,
}

impl SymbolDescriptor {
    fn new(bound_name: impl Into<String>, kind: SymbolKind) -> Self {
        let bound_name = bound_name.into();
        Self {
            source_name: bound_name.clone(),
            bound_name,
            kind,
            requiredness: Requiredness::Required,
            variadic: false,
        }
    }

    /// A required function resolved under its own name.
    pub fn function(bound_name: impl Into<String>) -> Self {
        Self::new(bound_name, SymbolKind::Function)
    }

    /// A required global variable resolved under its own name.
    pub fn variable(bound_name: impl Into<String>) -> Self {
        Self::new(bound_name, SymbolKind::Variable)
    }

    /// Resolve under a different exported name.
    pub fn source(mut self, source_name: impl Into<String>) -> Self {
        self.source_name = source_name.into();
        self
    }

    pub fn optional(self) -> Self {
        self.with_requiredness(Requiredness::Optional)
    }

    pub fn required(self) -> Self {
        self.with_requiredness(Requiredness::Required)
    }

    pub fn with_requiredness(mut self, requiredness: Requiredness) -> Self {
        self.requiredness = requiredness;
        self
    }

    /// Mark a function as taking a variable argument list.
    ///
    /// Only the caller's calling contract changes; resolution is identical.
    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    pub fn bound_name(&self) -> &str {
        &self.bound_name
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn kind(&self) -> SymbolKind {
        self.kind
    }

    pub fn requiredness(&self) -> Requiredness {
        self.requiredness
    }

    pub fn is_required(&self) -> bool {
        self.requiredness == Requiredness::Required
    }

    pub fn is_variadic(&self) -> bool {
        self.variadic
    }

    pub(crate) fn validate(&self) -> Result<(), SpecError> {
        if self.bound_name.is_empty() {
            return Err(SpecError::EmptyBoundName);
        }
        if self.source_name.is_empty() {
            return Err(SpecError::EmptySourceName(self.bound_name.clone()));
        }
        if self.source_name.contains('\0') {
            return Err(SpecError::InteriorNul(self.source_name.clone()));
        }
        if self.variadic && self.kind != SymbolKind::Function {
            return Err(SpecError::VariadicVariable(self.bound_name.clone()));
        }
        Ok(())
    }
}
