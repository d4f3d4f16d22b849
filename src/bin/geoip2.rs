mod cli_utils;
mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use geoip2::StorageMode;
use std::path::PathBuf;

use commands::{cmd_inspect, cmd_lookup};

#[derive(Parser)]
#[command(name = "geoip2")]
#[command(
    about = "Look up IP addresses in MaxMind DB (.mmdb) files",
    long_about = "geoip2 - Fast, read-only reader for MaxMind DB files\n\n\
    Looks up IPv4 and IPv6 addresses in GeoIP2 / GeoLite2 and other MMDB\n\
    databases locally, printing the matching record as JSON.\n\n\
    Examples:\n\
      geoip2 lookup GeoLite2-City.mmdb 81.2.69.142\n\
      geoip2 lookup GeoLite2-City.mmdb 81.2.69.142 city names en\n\
      geoip2 lookup GeoLite2-Country.mmdb.gz 2001:218:: --mode memory\n\
      geoip2 inspect GeoLite2-City.mmdb --verbose"
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up an IP address
    Lookup {
        /// Path to the MaxMind DB file (.mmdb or .mmdb.gz)
        #[arg(value_name = "DATABASE")]
        database: PathBuf,

        /// IPv4 or IPv6 address
        #[arg(value_name = "IP")]
        ip: String,

        /// Path into the record (map keys, or integer array indexes)
        #[arg(value_name = "PATH")]
        path: Vec<String>,

        /// Quiet mode - no output, only exit code (0 = found, 1 = not found)
        #[arg(short, long)]
        quiet: bool,

        /// Storage mode: mmap (default) or memory
        #[arg(long, default_value = "mmap")]
        mode: StorageMode,

        /// Show timing and database details on stderr
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show database metadata
    Inspect {
        /// Path to the MaxMind DB file (.mmdb or .mmdb.gz)
        #[arg(value_name = "DATABASE")]
        database: PathBuf,

        /// Output metadata as JSON
        #[arg(short, long)]
        json: bool,

        /// Show the full raw metadata map
        #[arg(short, long)]
        verbose: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Lookup {
            database,
            ip,
            path,
            quiet,
            mode,
            verbose,
        } => cmd_lookup(database, ip, path, quiet, mode, verbose),
        Commands::Inspect {
            database,
            json,
            verbose,
        } => cmd_inspect(database, json, verbose),
    }
}
