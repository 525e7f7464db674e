use std::path::PathBuf;

use clap::Parser;

use crate::application::data::LogLevel;

/// Restores the modification times of a git working tree from its commit history
#[derive(Parser, Debug, Clone)]
#[command(version)]
pub struct Cli {
    #[clap(long, short, default_value = "warn", value_enum)]
    pub log_level: LogLevel,

    /// The root directory of the git working tree
    #[clap(long, short, default_value = ".")]
    pub root: PathBuf,

    /// Revision whose first-parent history is replayed, overrides the config file
    #[clap(long)]
    pub revision: Option<String>,

    /// Replay the history and report the resolved times without touching any file
    #[clap(long)]
    pub dry_run: bool,
}
