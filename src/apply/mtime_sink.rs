use std::convert::Infallible;
use std::fs::{File, FileTimes};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::thread::available_parallelism;
use std::time::SystemTime;

use compio::dispatcher::{Dispatcher, DispatcherBuilder};
use snafu::{ResultExt, Snafu};
use tracing::{debug, info};

use crate::ext::SystemTimeExt;
use crate::filesystem::VirtualTree;

/// A resolved modification time for a path relative to the repository root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MtimeEntry {
    pub path: PathBuf,
    pub modified_time: SystemTime,
}

impl MtimeEntry {
    /// Collects an entry for every node of the tree.
    pub fn collect(tree: &VirtualTree) -> Vec<Self> {
        let mut entries = Vec::with_capacity(tree.len());
        let Ok(()) = tree.walk(|node, path| {
            entries.push(MtimeEntry {
                path: path.to_path_buf(),
                modified_time: node.modified_time(),
            });
            Ok::<_, Infallible>(())
        });
        entries
    }
}

/// Destination of the resolved modification times.
pub trait MtimeSink {
    /// Applies every entry and returns how many paths were updated.
    async fn apply(&self, entries: Vec<MtimeEntry>) -> Result<usize, ApplyError>;
}

/// Writes modification times onto the files below `root`, spread over a pool of workers.
pub struct FilesystemSink {
    root: PathBuf,
    dispatcher: Dispatcher,
    workers: NonZeroUsize,
}

impl FilesystemSink {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, ApplyError> {
        let workers = Self::determine_worker_count();
        debug!("Using {} worker threads to apply mtimes", workers);

        let dispatcher = DispatcherBuilder::new()
            .worker_threads(workers)
            .build()
            .context(DispatcherSnafu)?;

        Ok(Self {
            root: root.into(),
            dispatcher,
            workers,
        })
    }

    /// Falls back to a single worker when the system parallelism is unknown
    fn determine_worker_count() -> NonZeroUsize {
        available_parallelism().unwrap_or(NonZeroUsize::MIN)
    }
}

impl MtimeSink for FilesystemSink {
    async fn apply(&self, entries: Vec<MtimeEntry>) -> Result<usize, ApplyError> {
        if entries.is_empty() {
            return Ok(0);
        }

        let chunk_size = entries.len().div_ceil(self.workers.get());
        let mut receivers = Vec::new();
        let mut remaining = entries;
        while !remaining.is_empty() {
            let rest = remaining.split_off(chunk_size.min(remaining.len()));
            let chunk = std::mem::replace(&mut remaining, rest);
            let root = self.root.clone();
            let receiver = self
                .dispatcher
                .dispatch(move || async move { apply_chunk(&root, chunk) })
                .map_err(|e| ApplyError::DispatchError {
                    error: e.to_string(),
                })?;
            receivers.push(receiver);
        }
        debug!("Dispatched {} chunks of up to {} paths", receivers.len(), chunk_size);

        let mut updated = 0;
        for receiver in receivers {
            updated += receiver.await.context(WorkerCanceledSnafu)??;
        }
        info!("{} mtimes updated", updated);
        Ok(updated)
    }
}

fn apply_chunk(root: &Path, chunk: Vec<MtimeEntry>) -> Result<usize, ApplyError> {
    let now = SystemTime::now();
    let mut updated = 0;
    for entry in chunk {
        let path = root.join(&entry.path);
        if apply_entry(&path, now, entry.modified_time)? {
            updated += 1;
        }
    }
    Ok(updated)
}

/// Sets access time to `now` and modification time to `modified_time`.
///
/// Symlinks are skipped: their own times cannot be set without following them.
/// The path is opened first, so it must be readable; owning it is not enough.
fn apply_entry(path: &Path, now: SystemTime, modified_time: SystemTime) -> Result<bool, ApplyError> {
    let metadata = std::fs::symlink_metadata(path).context(MetadataSnafu { path })?;
    if metadata.file_type().is_symlink() {
        debug!("Skipping symlink {}", path.display());
        return Ok(false);
    }

    let file = File::open(path).context(OpenSnafu { path })?;
    let times = FileTimes::new()
        .set_accessed(now)
        .set_modified(modified_time);
    file.set_times(times).context(SetTimesSnafu { path })?;
    Ok(true)
}

/// Reports the resolved times without touching the filesystem.
#[derive(Debug, Default)]
pub struct DryRunSink;

impl MtimeSink for DryRunSink {
    async fn apply(&self, mut entries: Vec<MtimeEntry>) -> Result<usize, ApplyError> {
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        for entry in &entries {
            info!(
                "Would set mtime of {} to {}",
                entry.path.display(),
                entry.modified_time.unix_seconds()
            );
        }
        Ok(entries.len())
    }
}

#[derive(Debug, Snafu)]
pub enum ApplyError {
    #[snafu(display("Failed to create mtime worker pool"))]
    DispatcherError { source: std::io::Error },
    #[snafu(display("Failed to dispatch mtime updates: {}", error))]
    DispatchError { error: String },
    #[snafu(display("Mtime worker got cancelled"))]
    WorkerCanceled {
        source: futures_channel::oneshot::Canceled,
    },
    #[snafu(display("Failed to read metadata of {}", path.display()))]
    MetadataError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Failed to open {}", path.display()))]
    OpenError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Failed to set the times of {}", path.display()))]
    SetTimesError {
        path: PathBuf,
        source: std::io::Error,
    },
}
