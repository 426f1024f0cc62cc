//! Buckets raw SQLite error messages for the repair loop.

use serde::Serialize;

/// Category of a failed execution, derived from the raw error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Syntax,
    MissingTable,
    MissingColumn,
    Performance,
    Other,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Syntax => "syntax",
            ErrorKind::MissingTable => "missing_table",
            ErrorKind::MissingColumn => "missing_column",
            ErrorKind::Performance => "performance",
            ErrorKind::Other => "other",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps an error message to its category. Total: every input lands in
/// exactly one bucket, checked in priority order so a message matching
/// several rules gets the earliest one.
pub fn classify(message: &str) -> ErrorKind {
    if message.trim().is_empty() {
        return ErrorKind::Unknown;
    }
    let lowered = message.to_lowercase();
    if lowered.contains("syntax error") || lowered.contains("near") {
        ErrorKind::Syntax
    } else if lowered.contains("no such table") {
        ErrorKind::MissingTable
    } else if lowered.contains("no such column") {
        ErrorKind::MissingColumn
    } else if lowered.contains("timeout") || lowered.contains("too many") {
        ErrorKind::Performance
    } else {
        ErrorKind::Other
    }
}
