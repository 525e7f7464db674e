use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use compio::io::compat::AsyncStream;
use compio::process::{Child, ChildStderr, ChildStdout, Command};
use compio::runtime::spawn;
use futures::{AsyncBufReadExt, StreamExt, io::BufReader};
use snafu::{OptionExt, ResultExt, Snafu, ensure};
use tracing::{debug, info, warn};

use crate::application::RuntimeConfig;

pub type GitLogReader = BufReader<AsyncStream<ChildStdout>>;

/// Invocation of `git log` producing the raw, oldest-first, first-parent history.
///
/// `--first-parent` keeps the history a single chain, and since no merge diff option is
/// passed git never prints combined records for merge commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitLogCommand {
    binary: String,
    root: PathBuf,
    rename_limit: u32,
    revision: String,
}

impl GitLogCommand {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            binary: config.git_binary.clone(),
            root: config.root.clone(),
            rename_limit: config.rename_limit,
            revision: config.revision.clone(),
        }
    }

    pub fn args(&self) -> Vec<String> {
        vec![
            "-c".to_string(),
            format!("diff.renameLimit={}", self.rename_limit),
            "log".to_string(),
            "--raw".to_string(),
            "--first-parent".to_string(),
            "--pretty=%at".to_string(),
            "--reverse".to_string(),
            self.revision.clone(),
            "--".to_string(),
        ]
    }

    /// Starts git with its stdout piped. The history is read from [`GitLogProcess::reader`].
    pub fn spawn(&self) -> Result<GitLogProcess, GitLogError> {
        let args = self.args();
        info!("Running {} {}", self.binary, args.join(" "));

        let mut cmd = Command::new(&self.binary);
        cmd.args(&args);
        cmd.current_dir(&self.root);
        let _ = cmd.stdin(Stdio::null());
        let _ = cmd.stdout(Stdio::piped());
        let _ = cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn().context(SpawnSnafu {
            binary: self.binary.clone(),
        })?;

        if let Some(stderr) = child.stderr.take() {
            spawn_stderr_handler(stderr);
        }

        Ok(GitLogProcess {
            binary: self.binary.clone(),
            child,
        })
    }
}

pub struct GitLogProcess {
    binary: String,
    child: Child,
}

impl GitLogProcess {
    /// Hands out git's stdout as a buffered line reader. Can only be taken once.
    pub fn reader(&mut self) -> Result<GitLogReader, GitLogError> {
        let stdout = self.child.stdout.take().context(MissingStdoutSnafu {
            binary: self.binary.clone(),
        })?;
        Ok(BufReader::new(AsyncStream::new(stdout)))
    }

    /// Waits for git to exit and checks its exit status.
    pub async fn finish(self) -> Result<(), GitLogError> {
        let status = self.child.wait().await.context(WaitSnafu {
            binary: self.binary.clone(),
        })?;
        debug!("{} exited with {}", self.binary, status);
        check_status(&self.binary, status)
    }
}

fn check_status(binary: &str, status: ExitStatus) -> Result<(), GitLogError> {
    ensure!(
        status.success(),
        UnsuccessfulExecutionSnafu {
            binary,
            status: status.code().unwrap_or(-1),
        }
    );
    Ok(())
}

/// Forwards git's stderr to the log, git reports problems such as "not a git repository" there.
fn spawn_stderr_handler(stderr: ChildStderr) {
    let stream = AsyncStream::new(stderr);
    spawn(async move {
        let reader = BufReader::new(stream);
        let mut lines = reader.lines();

        while let Some(line_result) = lines.next().await {
            match line_result {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        warn!("git: {}", line.trim());
                    }
                }
                Err(e) => {
                    debug!("Error reading git stderr: {}", e);
                }
            }
        }
    })
    .detach();
}

#[derive(Debug, Snafu)]
pub enum GitLogError {
    #[snafu(display("Failed to spawn '{}', is git installed?", binary))]
    SpawnError {
        binary: String,
        source: std::io::Error,
    },
    #[snafu(display("Standard output of '{}' was not captured", binary))]
    MissingStdout { binary: String },
    #[snafu(display("Failed to wait for '{}'", binary))]
    WaitError {
        binary: String,
        source: std::io::Error,
    },
    #[snafu(display("'{}' log failed with exit code {}", binary, status))]
    UnsuccessfulExecution { binary: String, status: i32 },
}
