use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "warden-server", version)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Serve,
    Migrate,
    /// Create the configured superuser if it does not exist yet.
    Bootstrap,
    /// Authorize one action against a freshly loaded snapshot.
    Check {
        #[arg(long)]
        role: String,
        #[arg(long)]
        permission: String,
        /// Canonical resource name, e.g. `data/ks/t` or `roles/alice`.
        #[arg(long)]
        resource: String,
    },
    ListPermissions {
        #[arg(long)]
        role: Option<String>,
    },
}
