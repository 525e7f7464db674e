use std::path::PathBuf;

use crate::cli::Cli;
use crate::config::RestampConfig;

/// Settings for a single run, command line arguments taking precedence over the config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub root: PathBuf,
    pub git_binary: String,
    pub rename_limit: u32,
    pub revision: String,
    pub dry_run: bool,
}

impl From<(Cli, RestampConfig)> for RuntimeConfig {
    fn from((cli, config): (Cli, RestampConfig)) -> Self {
        Self {
            root: cli.root,
            git_binary: config.git_binary,
            rename_limit: config.rename_limit,
            revision: cli.revision.unwrap_or(config.revision),
            dry_run: cli.dry_run,
        }
    }
}
