use compio::runtime::spawn;
use snafu::Snafu;
use snafu::prelude::*;
use tracing::{debug, info, warn};

use crate::apply::{ApplyError, DryRunSink, FilesystemSink, MtimeEntry, MtimeSink};
use crate::application::RuntimeConfig;
use crate::cli::Cli;
use crate::config::{ConfigCreationError, RestampConfig};
use crate::history::{CancellationFlag, GitLogCommand, GitLogError, LogParser};
use crate::replay::{ReplayDriver, ReplayError};

pub struct Application;

impl Application {
    /// Replays the history of the working tree at `cli.root` and applies the resolved mtimes.
    ///
    /// Returns the number of paths updated (or that would be, on a dry run).
    pub async fn run(cli: Cli, cancellation: CancellationFlag) -> Result<usize, ApplicationError> {
        let config = RestampConfig::read(&cli.root)
            .await
            .context(ConfigSnafu)?;
        debug!("Loaded config: {:?}", config);
        let runtime_config = RuntimeConfig::from((cli, config));

        let mut git_log = GitLogCommand::new(&runtime_config)
            .spawn()
            .context(HistorySourceSnafu)?;
        let mut parser = LogParser::new(
            git_log.reader().context(HistorySourceSnafu)?,
            cancellation,
        );

        let (tree, stats) = ReplayDriver::new()
            .replay(&mut parser)
            .await
            .context(ReplaySnafu)?;
        git_log.finish().await.context(HistorySourceSnafu)?;
        info!(
            "Replay finished: {} added, {} modified, {} deleted, {} renamed",
            stats.added, stats.modified, stats.deleted, stats.renamed
        );
        if tree.is_empty() {
            warn!("The replayed history left no files, nothing to update");
        }

        let entries = MtimeEntry::collect(&tree);
        let updated = if runtime_config.dry_run {
            Self::apply(&DryRunSink, entries).await?
        } else {
            let sink = FilesystemSink::new(&runtime_config.root).context(ApplySnafu)?;
            Self::apply(&sink, entries).await?
        };

        Ok(updated)
    }

    async fn apply(
        sink: &impl MtimeSink,
        entries: Vec<MtimeEntry>,
    ) -> Result<usize, ApplicationError> {
        debug!("Applying {} resolved mtimes", entries.len());
        sink.apply(entries).await.context(ApplySnafu)
    }

    /// Cancels `cancellation` when Ctrl-C is pressed.
    pub fn listen_for_ctrl_c(cancellation: CancellationFlag) {
        spawn(async move {
            match compio::signal::ctrl_c().await {
                Ok(()) => {
                    warn!("Received Ctrl-C, stopping");
                    cancellation.cancel();
                }
                Err(e) => debug!("Failed to listen for Ctrl-C: {}", e),
            }
        })
        .detach();
    }
}

#[derive(Debug, Snafu)]
pub enum ApplicationError {
    #[snafu(display("Critical failure encountered during configuration stage"))]
    ConfigError { source: ConfigCreationError },
    #[snafu(display("Critical failure encountered while reading the git history"))]
    HistorySourceError { source: GitLogError },
    #[snafu(display("Critical failure encountered while replaying the git history"))]
    ReplayError { source: ReplayError },
    #[snafu(display("Critical failure encountered while applying mtimes"))]
    ApplyError { source: ApplyError },
}
