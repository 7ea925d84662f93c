/*
 *  main.rs
 *
 *  dynbind - runtime shared-library bindings
 *  (c) 2020-26 Stuart Hunter
 *
 *  dynbind - open bindings from a manifest and report
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

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser, ValueHint};
use env_logger::Env;
use log::{error, info, warn};

use dynbind::{BindingEntry, Manifest, SymbolEntry};

include!(concat!(env!("OUT_DIR"), "/build_info.rs"));

/// CLI options. A manifest describes the bindings unless `--library` is
/// given, in which case a single ad-hoc binding is checked.
#[derive(Debug, Parser, Clone)]
#[command(name = "dynbind", about = "Open shared-library bindings and report what resolves", version)]
struct Cli {
    /// Path to a YAML manifest (overrides search)
    #[arg(long, value_hint = ValueHint::FilePath)]
    manifest: Option<PathBuf>,
    /// Only check the named binding
    #[arg(long)]
    binding: Option<String>,
    /// Candidate path for an ad-hoc binding, tried in the order given
    #[arg(long = "library", value_name = "PATH", value_hint = ValueHint::FilePath)]
    libraries: Vec<String>,
    /// Symbol for the ad-hoc binding: [var:]name[=source][?]
    #[arg(long = "symbol", value_name = "SYMBOL", requires = "libraries")]
    symbols: Vec<String>,
    #[arg(long)]
    log_level: Option<String>,
    /// dump the effective manifest and exit
    #[arg(long, action = ArgAction::SetTrue)]
    dump_manifest: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let manifest = match effective_manifest(&cli) {
        Ok(manifest) => manifest,
        Err(e) => {
            eprintln!("dynbind: {e:#}");
            return ExitCode::from(2);
        }
    };

    let level = cli
        .log_level
        .clone()
        .or_else(|| manifest.log_level.clone())
        .unwrap_or_else(|| "info".to_string());
    env_logger::Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();

    info!("{} v.{} built {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"), BUILD_DATE);

    match run(&cli, &manifest) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(2)
        }
    }
}

/// Manifest from `--library`/`--symbol`, or loaded from disk.
fn effective_manifest(cli: &Cli) -> Result<Manifest> {
    if cli.libraries.is_empty() {
        return Manifest::load(cli.manifest.as_deref()).context("loading manifest");
    }

    let symbols = cli
        .symbols
        .iter()
        .map(|s| s.parse::<SymbolEntry>())
        .collect::<Result<Vec<_>, _>>()?;
    let manifest = Manifest {
        log_level: None,
        bindings: vec![BindingEntry {
            name: cli.binding.clone().unwrap_or_else(|| "adhoc".to_string()),
            candidates: cli.libraries.clone(),
            env_override: None,
            lazy: false,
            global: false,
            symbols,
        }],
    };
    manifest.validate()?;
    Ok(manifest)
}

/// Open every selected binding; `Ok(false)` when any failed to open.
fn run(cli: &Cli, manifest: &Manifest) -> Result<bool> {
    if cli.dump_manifest {
        print!("{}", manifest.to_yaml()?);
        return Ok(true);
    }

    let selected: Vec<&BindingEntry> = match cli.binding.as_deref() {
        Some(name) if cli.libraries.is_empty() => match manifest.binding(name) {
            Some(entry) => vec![entry],
            None => bail!("no binding named '{name}' in manifest"),
        },
        _ => manifest.bindings.iter().collect(),
    };
    if selected.is_empty() {
        bail!("nothing to check: no manifest bindings and no --library given");
    }

    let mut all_open = true;
    for entry in selected {
        all_open &= check(entry)?;
    }
    Ok(all_open)
}

fn check(entry: &BindingEntry) -> Result<bool> {
    let mut binding = entry.bind()?;

    if let Err(e) = binding.try_open() {
        // read before anything else touches the loader
        let detail = binding.last_error();
        error!("{e}");
        if !detail.is_empty() {
            error!("  {detail}");
        }
        return Ok(false);
    }

    println!("{} <- {}", binding.name(), binding.library_path().unwrap_or("?"));
    for status in binding.symbols() {
        let d = status.descriptor;
        let source = if d.source_name() == d.bound_name() {
            String::new()
        } else {
            format!("({})", d.source_name())
        };
        match status.address {
            Some(address) => println!("  {:<24} {:<12} {:p}", d.bound_name(), source, address),
            None => {
                warn!("{}: optional symbol {} not available", binding.name(), d.bound_name());
                println!("  {:<24} {:<12} null", d.bound_name(), source);
            }
        }
    }

    binding.close();
    Ok(true)
}
