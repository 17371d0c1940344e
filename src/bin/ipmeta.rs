mod cli_utils;
mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use commands::{cmd_lookup, cmd_metadata, RecordKind};

#[derive(Parser)]
#[command(name = "ipmeta")]
#[command(
    about = "Look up IP addresses in MaxMind DB (MMDB) files",
    long_about = "ipmeta - Read-only reader for MaxMind DB (MMDB) files\n\n\
    Resolves IPv4 and IPv6 addresses through the database search tree and\n\
    prints the matching records as JSON. Files are memory-mapped.\n\n\
    Set RUST_LOG=debug to see how the database was parsed.\n\n\
    Examples:\n\
      ipmeta lookup GeoLite2-Country.mmdb 81.2.69.160 2001:218::1\n\
      ipmeta lookup --type country GeoLite2-Country.mmdb 81.2.69.160\n\
      ipmeta metadata GeoLite2-Country.mmdb"
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up one or more IP addresses
    Lookup {
        /// Path to the MMDB file
        #[arg(value_name = "DATABASE")]
        database: PathBuf,

        /// IP addresses to look up
        #[arg(value_name = "IP", required = true)]
        addresses: Vec<String>,

        /// Record shape: raw (default) prints the decoded data unchanged
        #[arg(short = 't', long = "type", value_enum, default_value_t = RecordKind::Raw)]
        kind: RecordKind,

        /// Quiet mode - no output, only exit code (0 = any found, 1 = none found)
        #[arg(short, long)]
        quiet: bool,
    },

    /// Print database metadata as JSON
    Metadata {
        /// Path to the MMDB file
        #[arg(value_name = "DATABASE")]
        database: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Lookup {
            database,
            addresses,
            kind,
            quiet,
        } => {
            let found = cmd_lookup(database, addresses, kind, quiet)?;
            std::process::exit(if found { 0 } else { 1 });
        }
        Commands::Metadata { database } => cmd_metadata(database),
    }
}
