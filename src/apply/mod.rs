//! Writing the resolved modification times back onto the working tree.

mod mtime_sink;

pub use mtime_sink::{ApplyError, DryRunSink, FilesystemSink, MtimeEntry, MtimeSink};
