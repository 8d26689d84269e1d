//! CLI argument definitions

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// pixcache - image resource loading with render-cache policy
#[derive(Parser)]
#[command(name = "pixcache")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load image sources through a render cache
    Fetch {
        /// Image sources (URLs or data URIs)
        #[arg(required = true)]
        sources: Vec<String>,

        /// Render configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Location of the document being rendered
        #[arg(long)]
        origin: Option<String>,

        /// Proxy endpoint for cross-origin images
        #[arg(long)]
        proxy: Option<String>,

        /// Image timeout in milliseconds (0 waits forever)
        #[arg(long)]
        timeout: Option<u64>,

        /// Load cross-origin images with anonymous CORS
        #[arg(long)]
        use_cors: bool,

        /// Allow cross-origin images that taint the output
        #[arg(long)]
        allow_taint: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Resolve the origin of a URL
    Origin {
        /// URL to resolve
        url: String,

        /// Location of the document being rendered
        #[arg(long)]
        origin: Option<String>,
    },

    /// Validate a render configuration file
    Config {
        /// Configuration file path
        file: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
