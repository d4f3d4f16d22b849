use anyhow::{Context, Result};
use geoip2::{Database, StorageMode};
use serde_json::json;
use std::path::PathBuf;
use std::time::Instant;

use crate::cli_utils::{format_bytes, parse_path};

pub fn cmd_lookup(
    database: PathBuf,
    ip: String,
    path: Vec<String>,
    quiet: bool,
    mode: StorageMode,
    verbose: bool,
) -> Result<()> {
    let load_start = Instant::now();
    let db = Database::from(&database)
        .mode(mode)
        .open()
        .with_context(|| format!("Failed to load database: {}", database.display()))?;

    if verbose {
        eprintln!(
            "[INFO] Opened {} ({}, {:?}) in {:.2?}",
            database.display(),
            format_bytes(db.size()?),
            db.storage_mode()?,
            load_start.elapsed()
        );
    }

    let query_start = Instant::now();
    let result = db
        .lookup(&ip)
        .with_context(|| format!("Lookup failed for: {}", ip))?;

    let value = match &result {
        Some(record) => record
            .get_value(&parse_path(&path))
            .with_context(|| format!("Failed to decode record for: {}", ip))?,
        None => None,
    };

    if verbose {
        eprintln!("[INFO] Lookup took {:.2?}", query_start.elapsed());
    }

    let found = value.is_some();
    if quiet {
        std::process::exit(if found { 0 } else { 1 });
    }

    match (result, value) {
        (Some(record), Some(value)) => {
            let (network, prefix_len) = record.network();
            let output = json!({
                "network": format!("{}/{}", network, prefix_len),
                "prefix_len": prefix_len,
                "data": value,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        _ => println!("null"),
    }

    std::process::exit(if found { 0 } else { 1 });
}
