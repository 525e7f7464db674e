//! Reading the commit history as an ordered stream of path-level changes.

mod cancellation;
mod change;
mod git_log;
mod log_parser;

pub use cancellation::CancellationFlag;
pub use change::{Change, ChangeDecodeError};
pub use git_log::{GitLogCommand, GitLogError};
pub use log_parser::{LogParser, ParseLogError};
