//! Command line interface definition

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// edx - document exchange with the regulator's messaging portal
#[derive(Parser)]
#[command(name = "edx")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Resumable upload, download and envelope extraction for portal documents")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Global arguments available for all commands
#[derive(Parser)]
pub struct GlobalArgs {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Use alternate config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Bearer token for the portal
    #[arg(long, global = true, env = "EDX_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Download a document, resuming with range requests
    #[command(alias = "dl")]
    Download {
        /// Document URL
        url: String,

        /// Destination file
        dest: PathBuf,

        /// Replace the destination if it already exists
        #[arg(long)]
        overwrite: bool,

        /// Bytes per range request (0 = whole document at once)
        #[arg(long, value_name = "BYTES")]
        chunk_size: Option<u64>,
    },

    /// Upload a file through a new upload session
    #[command(alias = "up")]
    Upload {
        /// File to upload
        file: PathBuf,

        /// Endpoint that grants the upload session
        #[arg(long, value_name = "URL")]
        session_url: String,

        /// Bytes per chunk (0 = single request)
        #[arg(long, value_name = "BYTES")]
        chunk_size: Option<u64>,
    },

    /// Extract the content of a PKCS#7 signed envelope
    Extract {
        /// Signed envelope
        src: PathBuf,

        /// Where to write the extracted content
        dest: PathBuf,
    },
}

impl Commands {
    /// Operation name used in events and logs
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Download { .. } => "download",
            Commands::Upload { .. } => "upload",
            Commands::Extract { .. } => "extract",
        }
    }
}
