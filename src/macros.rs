/*
 *  macros.rs
 *
 *  dynbind - runtime shared-library bindings
 *  (c) 2020-26 Stuart Hunter
 *
 *  Feature-gated diagnostic logging
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

// Library diagnostics only reach the logger when built with `debug-logging`.
// The disabled arm still type-checks its arguments so both builds agree.

#[cfg(feature = "debug-logging")]
macro_rules! bind_log {
    ($level:ident, $($arg:tt)+) => {
        log::$level!(target: "dynbind", $($arg)+)
    };
}

#[cfg(not(feature = "debug-logging"))]
macro_rules! bind_log {
    ($level:ident, $($arg:tt)+) => {
        if false {
            log::$level!(target: "dynbind", $($arg)+)
        }
    };
}
