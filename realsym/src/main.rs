//! # realsym - Main Entry Point
//!
//! Inspects its own process:
//! - **objects**: what the loader has mapped, and where
//! - **resolve**: an exported symbol's runtime address, found without `dlsym`
//! - **bootstrap**: the same search the hook library runs for `dlsym`

use anyhow::{Context, Result};
use clap::Parser;
use log::debug;
use realsym::bootstrap::{abort_unavailable, candidate_patterns, find_symbol, Resolution};
use realsym::cli::{Args, Command};
use realsym::discovery::{loaded_objects, LoadedObject, Pattern};
use realsym::{real_dlsym, SymbolAddress};
use std::os::unix::ffi::OsStrExt;

// Exit codes (2 is produced by clap on usage errors, 69 by the bootstrap path)
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            EXIT_ERROR
        }
    });
}

fn run() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Objects { pattern, json } => list_objects(pattern.as_deref(), json),
        Command::Resolve { symbol, patterns, json } => resolve_symbol(&symbol, patterns, json),
        Command::Bootstrap { patterns } => bootstrap(patterns),
    }
}

fn list_objects(pattern: Option<&str>, json: bool) -> Result<()> {
    let filter = pattern.map(Pattern::new);
    let objects: Vec<LoadedObject> = loaded_objects()
        .context("Failed to enumerate loaded objects")?
        .into_iter()
        .filter(|o| filter.as_ref().map_or(true, |f| f.matches(o.path().as_os_str().as_bytes())))
        .collect();
    debug!("{} objects after filtering", objects.len());

    if json {
        println!("{}", serde_json::to_string_pretty(&objects)?);
    } else {
        println!("{:<18}  {:<18}  {:>4}  {:<18}  PATH", "BASE", "BIAS", "SEGS", "DYNAMIC");
        for object in &objects {
            let dynamic = object.dynamic_section().map_or_else(|| "-".to_string(), |d| format!("0x{d:x}"));
            println!(
                "0x{:<16x}  0x{:<16x}  {:>4}  {:<18}  {}",
                object.base_address(),
                object.load_bias(),
                object.segments().len(),
                dynamic,
                object.path().display()
            );
        }
    }

    objects.into_iter().for_each(LoadedObject::release);
    Ok(())
}

fn with_default_candidates(patterns: Vec<String>) -> Vec<String> {
    if patterns.is_empty() {
        candidate_patterns()
    } else {
        patterns
    }
}

fn print_resolution(symbol: &str, found: &Resolution) {
    println!("{symbol}: {}", found.symbol.address);
    println!("  object:  {}", found.object.display());
    println!("  pattern: {}", found.pattern);
    println!(
        "  value:   0x{:x}{}",
        found.symbol.value,
        if found.symbol.absolute { " (absolute)" } else { "" }
    );
    println!("  index:   {}", found.symbol.index);
}

fn resolve_symbol(symbol: &str, patterns: Vec<String>, json: bool) -> Result<()> {
    let candidates = with_default_candidates(patterns);
    let found = find_symbol(&candidates, symbol)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&found)?);
    } else {
        print_resolution(symbol, &found);
    }
    Ok(())
}

fn bootstrap(patterns: Vec<String>) -> Result<()> {
    if patterns.is_empty() {
        // The cached entry point the hook library uses; exits 69 on failure
        let real = real_dlsym();
        println!("dlsym: {}", SymbolAddress(real as usize));
        println!("  candidates: {}", candidate_patterns().join(":"));
        return Ok(());
    }

    match find_symbol(&patterns, "dlsym") {
        Ok(found) => {
            print_resolution("dlsym", &found);
            Ok(())
        }
        Err(err) => abort_unavailable(&err),
    }
}
