/*
 *  manifest.rs
 *
 *  dynbind - runtime shared-library bindings
 *  (c) 2020-26 Stuart Hunter
 *
 *  YAML binding manifests
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

//! Declarative binding manifests.
//!
//! A manifest lists bindings the way a program would declare them up front:
//!
//! ```yaml
//! log_level: debug
//! bindings:
//!   - name: libm
//!     candidates: [libm.so, libm.so.6]
//!     env_override: DYNBIND_LIBM
//!     symbols:
//!       - name: cbrt
//!       - { name: sqrt, optional: true }
//!       - { name: sqrt2, source: sqrtf }
//!   - name: libc
//!     candidates: [libc.so.6]
//!     symbols:
//!       - { name: environ, kind: variable }
//!       - { name: printf, variadic: true }
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use dirs_next::home_dir;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::binding::{Binding, BindingSpec};
use crate::descriptor::{SymbolDescriptor, SymbolKind};
use crate::error::SpecError;
use crate::platform::SystemLoader;

/// Error type for manifest loading/validation.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("binding '{binding}': {source}")]
    Spec {
        binding: String,
        #[source]
        source: SpecError,
    },
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Top-level manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// e.g. "info" | "debug"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    #[serde(default)]
    pub bindings: Vec<BindingEntry>,
}

/// One library and the symbols wanted from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BindingEntry {
    pub name: String,
    pub candidates: Vec<String>,
    /// Environment variable tried before the candidates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_override: Option<String>,
    /// POSIX only: resolve lazily instead of at open
    #[serde(default)]
    pub lazy: bool,
    /// POSIX only: make the library's symbols globally visible
    #[serde(default)]
    pub global: bool,
    #[serde(default)]
    pub symbols: Vec<SymbolEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SymbolEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub kind: SymbolKind,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub variadic: bool,
}

impl Manifest {
    pub fn from_path(path: &Path) -> Result<Self, ManifestError> {
        let s = fs::read_to_string(path)?;
        s.parse()
    }

    /// Explicit path, or the first manifest found in the usual places.
    ///
    /// An explicit path that does not exist is an error; finding nothing
    /// while searching yields an empty manifest.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ManifestError> {
        let manifest = match explicit {
            Some(p) if p.exists() => Self::from_path(p)?,
            Some(p) => {
                return Err(ManifestError::Validation(format!(
                    "Manifest file not found: {}",
                    p.display()
                )));
            }
            None => match find_manifest_file() {
                Some(p) => Self::from_path(&p)?,
                None => Self::default(),
            },
        };
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn binding(&self, name: &str) -> Option<&BindingEntry> {
        self.bindings.iter().find(|b| b.name == name)
    }

    pub fn to_yaml(&self) -> Result<String, ManifestError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Binding names are unique and every entry forms a valid spec.
    pub fn validate(&self) -> Result<(), ManifestError> {
        let mut seen = HashSet::new();
        for entry in &self.bindings {
            if !seen.insert(entry.name.as_str()) {
                return Err(ManifestError::Validation(format!(
                    "binding '{}' is declared more than once",
                    entry.name
                )));
            }
            entry.to_spec()?;
        }
        Ok(())
    }
}

impl FromStr for Manifest {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(serde_yaml::from_str(s)?)
    }
}

impl BindingEntry {
    pub fn to_spec(&self) -> Result<BindingSpec, ManifestError> {
        let mut builder = BindingSpec::builder(self.name.clone())
            .candidates(self.candidates.iter().cloned())
            .symbols(self.symbols.iter().map(SymbolEntry::to_descriptor));
        if let Some(var) = &self.env_override {
            builder = builder.env_override(var.clone());
        }
        builder.build().map_err(|source| ManifestError::Spec {
            binding: self.name.clone(),
            source,
        })
    }

    /// Platform loader configured from this entry.
    #[cfg(unix)]
    pub fn loader(&self) -> SystemLoader {
        SystemLoader::with_mode(self.lazy, self.global)
    }

    /// Platform loader configured from this entry.
    #[cfg(not(unix))]
    pub fn loader(&self) -> SystemLoader {
        SystemLoader::default()
    }

    /// A closed binding ready to open.
    pub fn bind(&self) -> Result<Binding<SystemLoader>, ManifestError> {
        Ok(Binding::with_loader(self.to_spec()?, self.loader()))
    }
}

impl SymbolEntry {
    pub fn to_descriptor(&self) -> SymbolDescriptor {
        let mut descriptor = match self.kind {
            SymbolKind::Function => SymbolDescriptor::function(self.name.clone()),
            SymbolKind::Variable => SymbolDescriptor::variable(self.name.clone()),
        };
        if let Some(source) = &self.source {
            descriptor = descriptor.source(source.clone());
        }
        if self.optional {
            descriptor = descriptor.optional();
        }
        if self.variadic {
            descriptor = descriptor.variadic();
        }
        descriptor
    }
}

/// Shorthand used on the command line: `[var:]name[=source][?]`.
///
/// `var:` declares a variable, `=source` overrides the exported name and a
/// trailing `?` makes the symbol optional.
impl FromStr for SymbolEntry {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (rest, optional) = match s.strip_suffix('?') {
            Some(rest) => (rest, true),
            None => (s, false),
        };
        let (rest, kind) = match rest.strip_prefix("var:") {
            Some(rest) => (rest, SymbolKind::Variable),
            None => (rest, SymbolKind::Function),
        };
        let (name, source) = match rest.split_once('=') {
            Some((name, source)) => (name, Some(source.to_string())),
            None => (rest, None),
        };
        if name.is_empty() {
            return Err(ManifestError::Validation(format!("invalid symbol '{s}'")));
        }

        Ok(Self {
            name: name.to_string(),
            source,
            kind,
            optional,
            variadic: false,
        })
    }
}

/// Try common locations in order (first hit wins).
pub fn find_manifest_file() -> Option<PathBuf> {
    // XDG-style: ~/.config/dynbind/bindings.yaml
    if let Some(home) = home_dir() {
        let p = home.join(".config/dynbind/bindings.yaml");
        if p.exists() { return Some(p) }
        let p = home.join(".config/dynbind.yaml");
        if p.exists() { return Some(p) }
    }
    // project local
    for candidate in &["dynbind.yaml", "bindings.yaml"] {
        let p = PathBuf::from(candidate);
        if p.exists() { return Some(p) }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Requiredness;

    const SAMPLE: &str = r#"
log_level: debug
bindings:
  - name: libm
    candidates: [libm.so, libm.so.6]
    symbols:
      - name: cbrt
      - { name: sqrt, optional: true }
      - { name: sqrt2, source: sqrtf }
  - name: libc
    candidates: [libc.so.6]
    lazy: true
    symbols:
      - { name: environ, kind: variable }
      - { name: printf, variadic: true }
"#;

    #[test]
    fn test_parse_sample() {
        let manifest: Manifest = SAMPLE.parse().unwrap();
        assert_eq!(manifest.log_level.as_deref(), Some("debug"));
        assert_eq!(manifest.bindings.len(), 2);
        assert!(manifest.validate().is_ok());

        let libm = manifest.binding("libm").unwrap().to_spec().unwrap();
        assert_eq!(libm.candidates().paths(), ["libm.so", "libm.so.6"]);
        let symbols = libm.symbols();
        assert_eq!(symbols[0].requiredness(), Requiredness::Required);
        assert_eq!(symbols[1].requiredness(), Requiredness::Optional);
        assert_eq!(symbols[2].bound_name(), "sqrt2");
        assert_eq!(symbols[2].source_name(), "sqrtf");

        let c_entry = manifest.binding("libc").unwrap();
        assert!(c_entry.lazy);
        assert!(!c_entry.global);
        let spec = c_entry.to_spec().unwrap();
        assert_eq!(spec.symbols()[0].kind(), SymbolKind::Variable);
        assert!(spec.symbols()[1].is_variadic());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = "bindings:\n  - name: libm\n    candidate: [libm.so]\n";
        assert!(matches!(yaml.parse::<Manifest>(), Err(ManifestError::Yaml(_))));
    }

    #[test]
    fn test_duplicate_binding_names() {
        let yaml = "bindings:\n  - { name: a, candidates: [a.so] }\n  - { name: a, candidates: [b.so] }\n";
        let manifest: Manifest = yaml.parse().unwrap();
        assert!(matches!(manifest.validate(), Err(ManifestError::Validation(_))));
    }

    #[test]
    fn test_invalid_entry_names_binding() {
        let yaml = "bindings:\n  - { name: empty, candidates: [] }\n";
        let manifest: Manifest = yaml.parse().unwrap();
        match manifest.validate() {
            Err(ManifestError::Spec { binding, source }) => {
                assert_eq!(binding, "empty");
                assert_eq!(source, SpecError::NoCandidates);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_missing_explicit_path() {
        let result = Manifest::load(Some(Path::new("/nonexistent/dynbind.yaml")));
        assert!(matches!(result, Err(ManifestError::Validation(_))));
    }

    #[test]
    fn test_yaml_round_trip_keeps_entries() {
        let manifest: Manifest = SAMPLE.parse().unwrap();
        let again: Manifest = manifest.to_yaml().unwrap().parse().unwrap();
        assert_eq!(again, manifest);
    }

    #[test]
    fn test_symbol_shorthand() {
        let plain: SymbolEntry = "cbrt".parse().unwrap();
        assert_eq!(plain.to_descriptor(), SymbolDescriptor::function("cbrt"));

        let full: SymbolEntry = "sqrt2=sqrtf?".parse().unwrap();
        assert_eq!(
            full.to_descriptor(),
            SymbolDescriptor::function("sqrt2").source("sqrtf").optional()
        );

        let var: SymbolEntry = "var:environ".parse().unwrap();
        assert_eq!(var.kind, SymbolKind::Variable);

        assert!("?".parse::<SymbolEntry>().is_err());
        assert!("=sqrtf".parse::<SymbolEntry>().is_err());
    }
}
