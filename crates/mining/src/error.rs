use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum MiningError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (empty field list, threshold out of range, etc.).
    ConfigValidation(String),
    /// A raw row is too short for the configured field layout.
    FieldIndex { row: usize, index: usize, width: usize },
    /// A raw value would not survive a pivot write and reload.
    ReservedToken { row: usize, value: String, reason: &'static str },
    /// Existing pivot was built with a different key or data field count.
    LayoutMismatch { what: &'static str, pivot: usize, layout: usize },
    /// Persisted pivot table cannot be interpreted.
    PivotFormat(String),
    /// Two columns handed to the miner are not row-aligned.
    LengthMismatch { left: usize, right: usize },
    /// IO error (file read, write, etc.).
    Io(String),
}

impl fmt::Display for MiningError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::FieldIndex { row, index, width } => {
                write!(f, "row {row}: field index {index} out of range (row has {width} fields)")
            }
            Self::ReservedToken { row, value, reason } => {
                write!(f, "row {row}: value {value:?} {reason}")
            }
            Self::LayoutMismatch { what, pivot, layout } => {
                write!(f, "pivot table has {pivot} {what} field(s), layout configures {layout}")
            }
            Self::PivotFormat(msg) => write!(f, "malformed pivot table: {msg}"),
            Self::LengthMismatch { left, right } => {
                write!(f, "columns are not aligned: {left} vs {right} rows")
            }
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for MiningError {}

impl From<std::io::Error> for MiningError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
