//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "bugbuster",
    version,
    about = "Answers questions about software defects from imported defect records",
    long_about = "Bugbuster imports defect records, indexes them semantically and answers questions \
                  such as \"what is the root cause of SCRUM-7\" or \"show all kafka service issues\" \
                  with answers grounded in the matching records."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/bugbuster/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Profile to apply on top of the config file
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the chat endpoint over HTTP
    Serve {
        /// Address to bind, overrides server.bind
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Ask a single question
    Ask {
        /// Question to ask
        question: String,

        /// Conversation id, keeps follow-up context between calls in one process
        #[arg(long)]
        conversation: Option<String>,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Import defect records from a JSON file
    Import {
        /// JSON file with an array of issues (or {"issues": [...]})
        file: PathBuf,
    },

    /// List imported defect records
    Records {
        /// Show only records of one service
        #[arg(short, long)]
        service: Option<String>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
