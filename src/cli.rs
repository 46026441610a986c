use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "crc", version, about = "Manage the local cache of CRC bundles")]
pub struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, global = true, env = "CRC_BUNDLE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log filter used when `RUST_LOG` is not set (e.g. `debug`, `crc_bundle=trace`)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Extract a bundle archive into the cache and publish its client
    Extract {
        /// Path to the downloaded bundle archive
        archive: PathBuf,
    },
    /// Publish the client of an already extracted bundle
    Use {
        /// Bundle name, with or without its archive extension
        name: String,
    },
    /// Show the metadata of an extracted bundle
    Info {
        /// Bundle name, with or without its archive extension
        name: String,
    },
}
