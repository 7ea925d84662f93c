/*
 *  candidates.rs
 *
 *  dynbind - runtime shared-library bindings
 *  (c) 2020-26 Stuart Hunter
 *
 *  Candidate library paths and the fallback search
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

use crate::error::SpecError;
use crate::platform::{LibraryHandle, Loader};

/// Ordered, non-empty list of places to look for one library.
///
/// Entries may be absolute paths, bare file names left to the platform
/// search order, or any token the platform loader accepts. Listing several
/// lets one binding cover differing sonames such as `libfoo.so` and
/// `libfoo.so.6`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidatePaths(Vec<String>);

impl CandidatePaths {
    pub fn new<I, S>(paths: I) -> Result<Self, SpecError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let paths: Vec<String> = paths.into_iter().map(Into::into).collect();
        if paths.is_empty() {
            return Err(SpecError::NoCandidates);
        }
        if paths.iter().any(String::is_empty) {
            return Err(SpecError::EmptyCandidate);
        }
        // the loader could never be asked for these
        if let Some(path) = paths.iter().find(|p| p.contains('\0')) {
            return Err(SpecError::InteriorNul(path.clone()));
        }
        Ok(Self(paths))
    }

    /// Platform file name for a library stem.
    ///
    /// For example, for "foo" this returns:
    /// - Linux: "libfoo.so"
    /// - macOS: "libfoo.dylib"
    /// - Windows: "foo.dll"
    pub fn for_library(stem: &str) -> Result<Self, SpecError> {
        if stem.is_empty() {
            return Err(SpecError::EmptyCandidate);
        }
        let file_name = libloading::library_filename(stem);
        Self::new([file_name.to_string_lossy().into_owned()])
    }

    /// Try the value of environment variable `var` before everything else.
    ///
    /// Unset, empty or non-UTF-8 values leave the list unchanged.
    pub fn with_env_override(mut self, var: &str) -> Self {
        match std::env::var(var) {
            Ok(path) if !path.is_empty() => {
                bind_log!(debug, "{} overrides candidates with {}", var, path);
                self.0.insert(0, path);
            }
            _ => {}
        }
        self
    }

    pub fn paths(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Open the first candidate that loads.
    ///
    /// Candidates are tried strictly in order and the search stops at the
    /// first success, returning its position and handle. A failed attempt
    /// holds no OS resource, so nothing needs undoing between attempts.
    pub fn search<L: Loader + ?Sized>(&self, loader: &L) -> Option<(usize, LibraryHandle)> {
        for (index, path) in self.0.iter().enumerate() {
            match loader.open_library(path) {
                Some(handle) => {
                    bind_log!(info, "opened {} ({:?})", path, handle);
                    return Some((index, handle));
                }
                None => bind_log!(debug, "could not open {}", path),
            }
        }

        bind_log!(warn, "no candidate opened from {:?}", self.0);
        None
    }
}

impl<'a> IntoIterator for &'a CandidatePaths {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::MockLoader;
    use crate::platform::mock::MockCall;

    #[test]
    fn test_rejects_empty_list() {
        let empty: [&str; 0] = [];
        assert!(matches!(CandidatePaths::new(empty), Err(SpecError::NoCandidates)));
        assert_eq!(CandidatePaths::new(["libm.so", ""]), Err(SpecError::EmptyCandidate));
    }

    #[test]
    fn test_rejects_interior_nul() {
        assert_eq!(
            CandidatePaths::new(["libmath.so", "lib\0m.so"]),
            Err(SpecError::InteriorNul("lib\0m.so".into()))
        );
    }

    #[test]
    fn test_for_library() {
        let paths = CandidatePaths::for_library("math").unwrap_or_else(|e| panic!("{e}"));
        #[cfg(target_os = "linux")]
        assert_eq!(paths.paths(), ["libmath.so"]);
        #[cfg(target_os = "macos")]
        assert_eq!(paths.paths(), ["libmath.dylib"]);
        #[cfg(target_os = "windows")]
        assert_eq!(paths.paths(), ["math.dll"]);
        assert_eq!(paths.paths().len(), 1);
        assert!(CandidatePaths::for_library("").is_err());
    }

    #[test]
    fn test_env_override_goes_first() {
        let var = "DYNBIND_TEST_CANDIDATE_OVERRIDE";
        unsafe { std::env::set_var(var, "/opt/libmath.so") };
        let paths = CandidatePaths::new(["libmath.so"])
            .map(|p| p.with_env_override(var))
            .unwrap_or_else(|e| panic!("{e}"));
        unsafe { std::env::remove_var(var) };
        assert_eq!(paths.paths(), ["/opt/libmath.so", "libmath.so"]);
    }

    #[test]
    fn test_env_override_unset() {
        let paths = CandidatePaths::new(["libmath.so"])
            .map(|p| p.with_env_override("DYNBIND_TEST_UNSET_OVERRIDE"))
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(paths.paths(), ["libmath.so"]);
    }

    #[test]
    fn test_search_stops_at_first_success() {
        let loader = MockLoader::new()
            .with_library("libmath.so.6", &[])
            .with_library("libmath.so.7", &[]);
        let paths = CandidatePaths::new(["libmath.so", "libmath.so.6", "libmath.so.7"])
            .unwrap_or_else(|e| panic!("{e}"));

        let found = paths.search(&loader);
        assert_eq!(found.map(|(index, _)| index), Some(1));
        assert_eq!(
            loader.calls(),
            vec![
                MockCall::Open("libmath.so".into()),
                MockCall::Open("libmath.so.6".into()),
            ]
        );
        assert_eq!(loader.references("libmath.so.7"), 0);
    }

    #[test]
    fn test_search_all_fail() {
        let loader = MockLoader::new();
        let paths = CandidatePaths::new(["a.so", "b.so"]).unwrap_or_else(|e| panic!("{e}"));
        assert!(paths.search(&loader).is_none());
        assert_eq!(loader.calls().len(), 2);
    }
}
