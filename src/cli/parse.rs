//! CLI parse: clap types for playbook-sync. No behavior; definitions only.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// playbook-sync - keep generated playbook content in step with its inputs
#[derive(Parser, Debug)]
#[command(name = "playbook-sync")]
#[command(about = "Incrementally fetch and regenerate playbook content for changed entities")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short = 'v', conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(long, short = 'q')]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (when output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch and regenerate content for every changed entity
    Run {
        /// Limit the run to these target sections (repeatable); the company is always included
        #[arg(long = "section")]
        sections: Vec<String>,
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Hand stored generated content to the output renderer
    Render {
        /// Render only these keys (repeatable); default renders every record
        #[arg(long = "key")]
        keys: Vec<String>,
        /// Output directory (overrides config)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List stored records
    Status {
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Print one stored record as JSON
    Show {
        /// Entity key, e.g. "accounts:YMCA"
        key: String,
    },
    /// Remove every stored record
    Clear {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Run { .. } => "run",
            Commands::Render { .. } => "render",
            Commands::Status { .. } => "status",
            Commands::Show { .. } => "show",
            Commands::Clear { .. } => "clear",
        }
    }
}
