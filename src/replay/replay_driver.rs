use std::time::SystemTime;

use futures::AsyncBufRead;
use snafu::{ResultExt, Snafu};
use tracing::{debug, info};

use crate::ext::SystemTimeExt;
use crate::filesystem::{TreeError, VirtualTree};
use crate::history::{Change, LogParser, ParseLogError};

/// Counts of the changes applied during a replay, by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub added: usize,
    pub deleted: usize,
    pub modified: usize,
    pub renamed: usize,
}

impl ReplayStats {
    pub fn total(&self) -> usize {
        self.added + self.deleted + self.modified + self.renamed
    }
}

/// Sole owner of the virtual tree for the duration of a replay.
///
/// Changes must be applied in history order; a single failed change leaves the tree out of
/// sync with every later change, so the first failure ends the replay.
#[derive(Debug, Default)]
pub struct ReplayDriver {
    tree: VirtualTree,
    stats: ReplayStats,
}

impl ReplayDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, at: SystemTime, change: &Change) -> Result<(), ReplayError> {
        let result = match change {
            Change::Add { path } => {
                self.stats.added += 1;
                self.tree.create(path, at)
            }
            Change::Modify { path } => {
                self.stats.modified += 1;
                self.tree.touch(path, at)
            }
            Change::Delete { path } => {
                self.stats.deleted += 1;
                self.tree.remove(path, at)
            }
            Change::Rename { from, to } => {
                self.stats.renamed += 1;
                self.tree.rename(from, to, at)
            }
        };
        result.context(TreeOperationSnafu {
            change: change.to_string(),
            timestamp: at.unix_seconds(),
        })
    }

    /// Applies every change the parser yields, stopping at the first error.
    pub async fn replay<R: AsyncBufRead + Unpin>(
        mut self,
        parser: &mut LogParser<R>,
    ) -> Result<(VirtualTree, ReplayStats), ReplayError> {
        while let Some(event) = parser.next_event().await {
            let (at, change) = event.context(ParseSnafu)?;
            debug!("{} at {}", change, at.unix_seconds());
            self.apply(at, &change)?;
        }
        info!(
            "Replayed {} changes from {} lines of history",
            self.stats.total(),
            parser.lines_read()
        );
        Ok(self.finish())
    }

    pub fn finish(self) -> (VirtualTree, ReplayStats) {
        (self.tree, self.stats)
    }
}

#[derive(Debug, Snafu)]
pub enum ReplayError {
    #[snafu(display("Failed to parse the history log"))]
    ParseError { source: ParseLogError },
    #[snafu(display(
        "Failed to apply '{}' at {}, the history may not be linear",
        change,
        timestamp
    ))]
    TreeOperationError {
        change: String,
        timestamp: i64,
        source: TreeError,
    },
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::io::Cursor;

    use super::*;
    use crate::history::CancellationFlag;

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    async fn replay(input: &str) -> Result<(VirtualTree, ReplayStats), ReplayError> {
        let mut parser = LogParser::new(
            Cursor::new(input.as_bytes().to_vec()),
            CancellationFlag::new(),
        );
        ReplayDriver::new().replay(&mut parser).await
    }

    #[compio::test]
    async fn replays_a_small_history() {
        let input = "\
100
:000000 100644 0000000 1111111 A\tREADME.md
:000000 100644 0000000 2222222 A\tsrc/main.rs
:000000 100644 0000000 3333333 A\tsrc/util/strings.rs

200
:100644 100644 1111111 4444444 M\tREADME.md

300
:100644 100644 3333333 3333333 R100\tsrc/util/strings.rs\tsrc/strings.rs

400
:000000 100644 0000000 5555555 A\tdocs/guide.md
:100644 000000 2222222 0000000 D\tsrc/main.rs
";
        let (tree, stats) = replay(input).await.unwrap();

        assert_eq!(
            stats,
            ReplayStats {
                added: 4,
                deleted: 1,
                modified: 1,
                renamed: 1,
            }
        );
        assert_eq!(tree.get("README.md").unwrap().modified_time(), at(200));
        assert_eq!(tree.get("src/strings.rs").unwrap().modified_time(), at(100));
        assert_eq!(tree.get("src").unwrap().modified_time(), at(400));
        assert_eq!(tree.get("docs").unwrap().modified_time(), at(400));
        assert!(tree.get("src/util").is_err());
        assert!(tree.get("src/main.rs").is_err());
        assert_eq!(tree.len(), 5);
    }

    #[compio::test]
    async fn missing_path_aborts_the_replay() {
        let input = "100\n:000000 100644 0 1 A\ta\n200\n:100644 100644 1 2 M\tb\n";
        let error = replay(input).await.unwrap_err();

        match error {
            ReplayError::TreeOperationError {
                change,
                timestamp,
                source: TreeError::NotFound { path },
            } => {
                assert_eq!(change, "modify b");
                assert_eq!(timestamp, 200);
                assert_eq!(path, "b");
            }
            other => panic!("Expected TreeOperationError, got {other:?}"),
        }
    }

    #[compio::test]
    async fn duplicate_add_aborts_the_replay() {
        let input = "100\n:000000 100644 0 1 A\ta\n:000000 100644 0 1 A\ta\n";
        let error = replay(input).await.unwrap_err();
        assert!(matches!(
            error,
            ReplayError::TreeOperationError {
                source: TreeError::AlreadyExists { .. },
                ..
            }
        ));
    }

    #[compio::test]
    async fn parse_errors_are_propagated() {
        let error = replay("100\n:000000 100644 0 1 Z\ta\n").await.unwrap_err();
        assert!(matches!(error, ReplayError::ParseError { .. }));
    }

    #[test]
    fn apply_dispatches_each_kind() {
        let mut driver = ReplayDriver::new();
        driver
            .apply(at(1), &Change::Add { path: "a/b".to_string() })
            .unwrap();
        driver
            .apply(
                at(2),
                &Change::Rename {
                    from: "a/b".to_string(),
                    to: "c".to_string(),
                },
            )
            .unwrap();
        driver
            .apply(at(3), &Change::Modify { path: "c".to_string() })
            .unwrap();
        driver
            .apply(at(4), &Change::Delete { path: "c".to_string() })
            .unwrap();

        let (tree, stats) = driver.finish();
        assert_eq!(stats.total(), 4);
        assert!(tree.is_empty());
        assert_eq!(tree.root().modified_time(), at(4));
    }
}
