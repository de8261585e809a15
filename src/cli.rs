use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Gatepass — single-use QR admission token verification
#[derive(Parser)]
#[command(name = "gatepass", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the scan loop against a frame source
    Scan {
        /// Directory of greyscale .pgm frames replayed through the decode
        /// pipeline (hardware capture integrates behind the Capture trait)
        #[arg(long)]
        frames: PathBuf,

        /// Camera facing: environment or user
        #[arg(long)]
        facing: Option<String>,

        /// Write the session ledger to this file on exit
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// Redeem a single payload (manual entry / keyboard-wedge path)
    Redeem {
        payload: String,

        /// Print the result as JSON instead of the operator line
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Manage admission tokens
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },

    /// Export the store's used set as delimited text
    Export {
        /// Output file (stdout when omitted)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Column delimiter
        #[arg(long, default_value = "\t")]
        delimiter: char,
    },
}

#[derive(Subcommand)]
pub enum TokenCommands {
    /// Issue a single token (bulk issuance happens upstream)
    Issue {
        #[arg(long)]
        subject: String,

        /// Scope field; repeat for each field, e.g.
        /// --scope 2025-12-16 --scope Morning
        #[arg(long = "scope", required = true)]
        scope: Vec<String>,

        /// Explicit token id (defaults to a random opaque id)
        #[arg(long, conflicts_with = "embedded")]
        id: Option<String>,

        /// Derive the canonical subject+scope id (embedded-scope scheme)
        #[arg(long, default_value_t = false)]
        embedded: bool,
    },

    /// List issued tokens
    List {
        /// Only the used set
        #[arg(long, default_value_t = false)]
        used_only: bool,
    },
}
