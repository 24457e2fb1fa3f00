//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Nimbus uploader - resumable chunked uploads to a Nimbus drive
#[derive(Debug, Parser)]
#[command(name = "nimbus-uploader")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Files to upload
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Backend base URL (overrides the config file)
    #[arg(long)]
    pub server: Option<String>,

    /// Collection to add the uploaded files to
    #[arg(long)]
    pub collection: Option<String>,

    /// Account email; stored for later runs
    #[arg(long, requires = "password")]
    pub email: Option<String>,

    /// Account password
    #[arg(long, requires = "email")]
    pub password: Option<String>,

    /// Display name stored with the account
    #[arg(long, requires = "email")]
    pub display_name: Option<String>,

    /// Chunk size in MiB
    #[arg(long)]
    pub chunk_size_mib: Option<u32>,

    /// Files uploading at the same time
    #[arg(long)]
    pub max_uploads: Option<usize>,

    /// Chunk requests in flight per file
    #[arg(long)]
    pub max_chunks: Option<usize>,

    /// Per-request timeout in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Credential file
    #[arg(long)]
    pub credentials: Option<PathBuf>,

    /// Ignore stdin commands (pause, resume, retry, status, quit)
    #[arg(long)]
    pub no_input: bool,
}
