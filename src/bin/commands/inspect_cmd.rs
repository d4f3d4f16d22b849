use anyhow::{Context, Result};
use geoip2::Database;
use serde_json::json;
use std::path::PathBuf;

use crate::cli_utils::{format_bytes, format_unix_timestamp};

pub fn cmd_inspect(database: PathBuf, json_output: bool, verbose: bool) -> Result<()> {
    let db = Database::from(&database)
        .open()
        .with_context(|| format!("Failed to load database: {}", database.display()))?;

    let metadata = db.metadata()?;
    let size = db.size()?;

    if json_output {
        let mut output = json!({
            "file": database.display().to_string(),
            "size": size,
            "metadata": metadata,
        });
        if verbose {
            output["raw_metadata"] = serde_json::to_value(db.metadata_value()?)?;
        }
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Database: {}", database.display());
    println!("Size:     {}", format_bytes(size));
    println!();
    println!("Metadata:");
    println!("  Database type:   {}", metadata.database_type);

    if !metadata.description.is_empty() {
        println!("  Description:");
        for (lang, desc) in &metadata.description {
            println!("    {}: {}", lang, desc);
        }
    }

    if !metadata.languages.is_empty() {
        println!("  Languages:       {}", metadata.languages.join(", "));
    }

    println!(
        "  Build time:      {} ({})",
        format_unix_timestamp(metadata.build_epoch),
        metadata.build_epoch
    );
    println!("  IP version:      IPv{}", metadata.ip_version);
    println!("  Node count:      {}", metadata.node_count);
    println!("  Record size:     {} bits", metadata.record_size);
    println!(
        "  Format version:  {}.{}",
        metadata.binary_format_major_version, metadata.binary_format_minor_version
    );

    if verbose {
        println!();
        println!("Full metadata:");
        println!("{}", serde_json::to_string_pretty(&db.metadata_value()?)?);
    }

    Ok(())
}
