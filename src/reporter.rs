/*
 *  reporter.rs
 *
 *  dynbind - runtime shared-library bindings
 *  (c) 2020-26 Stuart Hunter
 *
 *  Error reporter - normalized platform loader error text
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

use crate::platform::ErrorSource;

/// Current platform loader error, normalized.
///
/// Empty when nothing is pending or the platform could not format a
/// message. Read it on the thread that made the failing call, before any
/// other loader activity.
pub fn last_error<S: ErrorSource + ?Sized>(source: &S) -> String {
    source
        .last_platform_error()
        .map(|raw| normalize(&raw).to_string())
        .unwrap_or_default()
}

/// Strip trailing carriage returns and line feeds; nothing else changes.
pub fn normalize(raw: &str) -> &str {
    raw.trim_end_matches(['\r', '\n'])
}
