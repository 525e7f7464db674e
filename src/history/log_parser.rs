use std::num::ParseIntError;
use std::time::SystemTime;

use futures::io::Lines;
use futures::{AsyncBufRead, AsyncBufReadExt, StreamExt};
use snafu::{OptionExt, ResultExt, Snafu};
use tracing::debug;

use crate::ext::SystemTimeExt;
use crate::history::{CancellationFlag, Change, ChangeDecodeError};

/// Pull-style parser for the output of `git log --raw --pretty=%at`.
///
/// The stream is made of timestamp lines (seconds since the epoch) each followed by the
/// raw change lines of that commit. Every change is yielded together with the last
/// timestamp seen before it, in stream order. Once an error has been returned the parser
/// yields nothing more.
pub struct LogParser<R> {
    lines: Lines<R>,
    cancellation: CancellationFlag,
    current_time: SystemTime,
    line_number: usize,
    finished: bool,
}

impl<R: AsyncBufRead + Unpin> LogParser<R> {
    pub fn new(reader: R, cancellation: CancellationFlag) -> Self {
        Self {
            lines: reader.lines(),
            cancellation,
            current_time: SystemTime::UNIX_EPOCH,
            line_number: 0,
            finished: false,
        }
    }

    /// Returns the next change, `None` once the stream is exhausted or an error was returned.
    pub async fn next_event(&mut self) -> Option<Result<(SystemTime, Change), ParseLogError>> {
        if self.finished {
            return None;
        }
        let result = self.advance().await;
        if !matches!(result, Some(Ok(_))) {
            debug!("Log parser finished after {} lines", self.line_number);
            self.finished = true;
        }
        result
    }

    pub fn lines_read(&self) -> usize {
        self.line_number
    }

    async fn advance(&mut self) -> Option<Result<(SystemTime, Change), ParseLogError>> {
        loop {
            if self.cancellation.is_cancelled() {
                return Some(CancelledSnafu.fail());
            }

            let line = match self.lines.next().await? {
                Ok(line) => line,
                Err(source) => {
                    return Some(Err(source).context(ReadSnafu {
                        line_number: self.line_number + 1,
                    }));
                }
            };
            self.line_number += 1;

            match self.parse_line(&line) {
                Ok(Some(event)) => return Some(Ok(event)),
                Ok(None) => continue,
                Err(error) => return Some(Err(error)),
            }
        }
    }

    fn parse_line(&mut self, line: &str) -> Result<Option<(SystemTime, Change)>, ParseLogError> {
        if line.is_empty() {
            return Ok(None);
        }

        if line.starts_with(':') {
            let change = Change::from_raw_line(line).context(DecodeSnafu {
                line_number: self.line_number,
            })?;
            return Ok(Some((self.current_time, change)));
        }

        let seconds = line.parse::<i64>().context(UnrecognisedLineSnafu {
            line,
            line_number: self.line_number,
        })?;
        self.current_time =
            SystemTime::from_unix_seconds(seconds).context(TimestampOutOfRangeSnafu { line })?;
        Ok(None)
    }
}

#[derive(Debug, Snafu)]
pub enum ParseLogError {
    #[snafu(display("Failed to read line {line_number} of the history log"))]
    ReadError {
        line_number: usize,
        source: std::io::Error,
    },
    #[snafu(display(
        "Unrecognised line {line_number}, expected timestamp, received '{line}'"
    ))]
    UnrecognisedLine {
        line: String,
        line_number: usize,
        source: ParseIntError,
    },
    #[snafu(display("Timestamp out of range: '{line}'"))]
    TimestampOutOfRange { line: String },
    #[snafu(display("Failed to decode change record on line {line_number}"))]
    DecodeError {
        line_number: usize,
        source: ChangeDecodeError,
    },
    #[snafu(display("History parsing was cancelled"))]
    Cancelled,
}
