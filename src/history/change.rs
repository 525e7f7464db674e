use std::fmt;

use snafu::{OptionExt, Snafu, ensure};

const METADATA_FIELD_COUNT: usize = 5;

/// A single path-level change from a `git log --raw` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Add { path: String },
    Delete { path: String },
    Modify { path: String },
    Rename { from: String, to: String },
}

impl Change {
    /// Decodes a raw change line such as `:100644 100644 aaa bbb M\tsrc/lib.rs`.
    pub fn from_raw_line(line: &str) -> Result<Self, ChangeDecodeError> {
        ensure!(!line.starts_with("::"), CombinedDiffSnafu { line });

        let mut fields = line.split('\t');
        let metadata = fields
            .next()
            .and_then(|metadata| metadata.strip_prefix(':'))
            .context(MetadataFieldCountSnafu { line })?;
        let paths = fields
            .map(|path| unquote_path(path).context(MalformedQuotedPathSnafu { line }))
            .collect::<Result<Vec<_>, _>>()?;

        let metadata = metadata.split(' ').collect::<Vec<_>>();
        ensure!(
            metadata.len() == METADATA_FIELD_COUNT,
            MetadataFieldCountSnafu { line }
        );
        let action = Action::parse(metadata[METADATA_FIELD_COUNT - 1], line)?;

        match (action, <[String; 1]>::try_from(paths)) {
            (Action::Add, Ok([path])) => Ok(Change::Add { path }),
            (Action::Delete, Ok([path])) => Ok(Change::Delete { path }),
            (Action::Modify, Ok([path])) => Ok(Change::Modify { path }),
            (Action::Rename, Err(paths)) => match <[String; 2]>::try_from(paths) {
                Ok([from, to]) => Ok(Change::Rename { from, to }),
                Err(_) => PathFieldCountSnafu { line }.fail(),
            },
            _ => PathFieldCountSnafu { line }.fail(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Change::Add { .. } => "add",
            Change::Delete { .. } => "delete",
            Change::Modify { .. } => "modify",
            Change::Rename { .. } => "rename",
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::Add { path } | Change::Delete { path } | Change::Modify { path } => {
                write!(f, "{} {}", self.kind(), path)
            }
            Change::Rename { from, to } => write!(f, "rename {from} -> {to}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Add,
    Delete,
    Modify,
    Rename,
}

impl Action {
    fn parse(code: &str, line: &str) -> Result<Self, ChangeDecodeError> {
        match code {
            "A" => Ok(Action::Add),
            "D" => Ok(Action::Delete),
            "M" => Ok(Action::Modify),
            // Renames carry a similarity score, e.g. R087
            _ if code.starts_with('R') => Ok(Action::Rename),
            _ => UnrecognisedActionSnafu { action: code, line }.fail(),
        }
    }
}

/// Undoes git's `core.quotePath` escaping. Unquoted paths are returned as is.
fn unquote_path(raw: &str) -> Option<String> {
    let Some(inner) = raw.strip_prefix('"') else {
        return Some(raw.to_string());
    };
    let inner = inner.strip_suffix('"')?;

    let mut bytes = Vec::with_capacity(inner.len());
    let mut chars = inner.bytes();
    while let Some(byte) = chars.next() {
        if byte != b'\\' {
            bytes.push(byte);
            continue;
        }
        let escaped = match chars.next()? {
            b'a' => 0x07,
            b'b' => 0x08,
            b't' => b'\t',
            b'n' => b'\n',
            b'v' => 0x0b,
            b'f' => 0x0c,
            b'r' => b'\r',
            b'"' => b'"',
            b'\\' => b'\\',
            digit @ b'0'..=b'3' => {
                let mid = chars.next().filter(u8::is_ascii_digit)?;
                let low = chars.next().filter(u8::is_ascii_digit)?;
                if mid > b'7' || low > b'7' {
                    return None;
                }
                ((digit - b'0') << 6) | ((mid - b'0') << 3) | (low - b'0')
            }
            _ => return None,
        };
        bytes.push(escaped);
    }
    String::from_utf8(bytes).ok()
}

#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum ChangeDecodeError {
    #[snafu(display("Unhandled line format, expected 5 metadata fields: '{line}'"))]
    MetadataFieldCount { line: String },
    #[snafu(display("Unrecognised action '{action}' in line '{line}'"))]
    UnrecognisedAction { action: String, line: String },
    #[snafu(display("Unhandled line format, unexpected number of paths: '{line}'"))]
    PathFieldCount { line: String },
    #[snafu(display("Combined diff record found, history is not linear: '{line}'"))]
    CombinedDiff { line: String },
    #[snafu(display("Malformed quoted path in line '{line}'"))]
    MalformedQuotedPath { line: String },
}
