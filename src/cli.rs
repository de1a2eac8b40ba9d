use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stemforge")]
#[command(author, version, about = "Resumable stem separation and publishing pipeline")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Process tracks as one playlist run
    Run {
        /// Catalog track ids
        #[arg(required = true)]
        tracks: Vec<String>,

        /// Playlist id to record the run under (generated if omitted)
        #[arg(long)]
        playlist: Option<String>,

        /// Channel to publish to; repeat for several (default: all configured)
        #[arg(long = "channel")]
        channels: Vec<String>,

        /// Run profile: full or lightweight
        #[arg(long)]
        profile: Option<String>,
    },

    /// Resume one playlist, or every incomplete one
    Resume {
        /// Playlist to resume
        playlist: Option<String>,
    },

    /// Show checkpoint statistics and incomplete playlists
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Export every checkpoint to a JSON file
    Export {
        /// Output file
        #[arg(required = true)]
        output: PathBuf,
    },

    /// Delete all checkpoints, cached references and failure records
    Clear {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
