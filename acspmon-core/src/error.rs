//! Error types for command-output parsing

use thiserror::Error;

/// Errors raised while parsing AP shell command output.
///
/// Parsers never partially update a record: they return a fully parsed
/// value or one of these errors, and the caller decides what to apply.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// Output has fewer lines than the fixed table layout requires
    #[error("Output too short: expected at least {expected} lines, got {actual}")]
    TooShort { expected: usize, actual: usize },

    /// A known field pattern did not match
    #[error("Missing field '{field}' in output: {line}")]
    MissingField { field: &'static str, line: String },

    /// A row did not split into the expected number of columns
    #[error("Unexpected token count ({count}) in row: {line}")]
    BadRow { count: usize, line: String },

    /// A numeric column failed to parse
    #[error("Invalid number '{token}' in row: {line}")]
    BadNumber { token: String, line: String },
}

/// Errors raised while parsing the probe target-set specifier.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TargetSpecError {
    #[error("Invalid IPv4 address in target set '{0}'")]
    BadAddress(String),

    #[error("Invalid prefix length '{0}', must be 0-32")]
    BadPrefix(String),

    #[error("Invalid host count '{0}' in range target")]
    BadCount(String),
}
