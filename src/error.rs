//! Error types for the spreadsheet engine.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for engine operations.
///
/// Every variant maps to a stable [`ErrorKind`] tag that is surfaced to the
/// host together with a short title and a remediation hint.
#[derive(Debug, Error)]
pub enum SheetError {
    #[error("Invalid argument: {0}")]
    InvalidArg(String),

    #[error("No column {column} in {table}")]
    NoColumn { table: String, column: String },

    #[error("No table {0}")]
    NoTable(String),

    #[error("Duplicated column header {header} in {table}")]
    DuplicatedColumn { table: String, header: String },

    #[error("Formula for {column} creates a circular reference")]
    CyclicFormula { column: String },

    #[error("Unsupported function: {0}")]
    UnsupportedFunction(String),

    #[error("Operator {operator} cannot be applied to {left} and {right}")]
    OperatorType {
        operator: String,
        left: String,
        right: String,
    },

    #[error("Error in function {function}: {message}")]
    Function { function: String, message: String },

    #[error("Invalid formula {formula}: {message}")]
    InvalidFormula { formula: String, message: String },

    #[error("Column {column} cannot be sorted: {message}")]
    InvalidSort { column: String, message: String },

    #[error("Column {column} is referenced by the formulas of {dependents:?}")]
    ColumnInUse {
        column: String,
        dependents: Vec<String>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Could not decode {path} as {encoding}")]
    BadEncoding { path: PathBuf, encoding: String },

    #[error("Import failed: {0}")]
    Import(String),

    #[error("Updating imports failed: {0}")]
    InvalidUpdateImports(String),

    #[error("Replay failed at step {step_index} ({step_type}): {message}")]
    ReplayFailed {
        step_index: usize,
        step_type: String,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Invalid analysis format: {0}")]
    InvalidFormat(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Analysis directory is locked by another process")]
    Locked,
}

/// Stable tag describing the category of a [`SheetError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    InvalidArg,
    NoColumn,
    NoTable,
    DuplicatedColumn,
    CyclicFormula,
    UnsupportedFunction,
    OperatorTypeError,
    FunctionError,
    InvalidFormula,
    InvalidSort,
    ColumnInUse,
    FileNotFound,
    BadEncoding,
    ImportError,
    InvalidUpdateImports,
    ReplayFailed,
    Io,
    Serialization,
    InvalidFormat,
    ChecksumMismatch,
    Locked,
}

impl ErrorKind {
    /// The kebab-case tag sent to the host.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArg => "invalid-arg",
            ErrorKind::NoColumn => "no-column",
            ErrorKind::NoTable => "no-table",
            ErrorKind::DuplicatedColumn => "duplicated-column",
            ErrorKind::CyclicFormula => "cyclic-formula",
            ErrorKind::UnsupportedFunction => "unsupported-function",
            ErrorKind::OperatorTypeError => "operator-type-error",
            ErrorKind::FunctionError => "function-error",
            ErrorKind::InvalidFormula => "invalid-formula",
            ErrorKind::InvalidSort => "invalid-sort",
            ErrorKind::ColumnInUse => "column-in-use",
            ErrorKind::FileNotFound => "file-not-found",
            ErrorKind::BadEncoding => "bad-encoding",
            ErrorKind::ImportError => "import-error",
            ErrorKind::InvalidUpdateImports => "invalid-update-imports",
            ErrorKind::ReplayFailed => "replay-failed",
            ErrorKind::Io => "io",
            ErrorKind::Serialization => "serialization",
            ErrorKind::InvalidFormat => "invalid-format",
            ErrorKind::ChecksumMismatch => "checksum-mismatch",
            ErrorKind::Locked => "locked",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SheetError {
    pub fn invalid_arg(message: impl Into<String>) -> Self {
        SheetError::InvalidArg(message.into())
    }

    pub fn no_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        SheetError::NoColumn {
            table: table.into(),
            column: column.into(),
        }
    }

    pub fn function(function: impl Into<String>, message: impl Into<String>) -> Self {
        SheetError::Function {
            function: function.into(),
            message: message.into(),
        }
    }

    pub fn operator_type(
        operator: impl Into<String>,
        left: impl Into<String>,
        right: impl Into<String>,
    ) -> Self {
        SheetError::OperatorType {
            operator: operator.into(),
            left: left.into(),
            right: right.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SheetError::InvalidArg(_) => ErrorKind::InvalidArg,
            SheetError::NoColumn { .. } => ErrorKind::NoColumn,
            SheetError::NoTable(_) => ErrorKind::NoTable,
            SheetError::DuplicatedColumn { .. } => ErrorKind::DuplicatedColumn,
            SheetError::CyclicFormula { .. } => ErrorKind::CyclicFormula,
            SheetError::UnsupportedFunction(_) => ErrorKind::UnsupportedFunction,
            SheetError::OperatorType { .. } => ErrorKind::OperatorTypeError,
            SheetError::Function { .. } => ErrorKind::FunctionError,
            SheetError::InvalidFormula { .. } => ErrorKind::InvalidFormula,
            SheetError::InvalidSort { .. } => ErrorKind::InvalidSort,
            SheetError::ColumnInUse { .. } => ErrorKind::ColumnInUse,
            SheetError::FileNotFound(_) => ErrorKind::FileNotFound,
            SheetError::BadEncoding { .. } => ErrorKind::BadEncoding,
            SheetError::Import(_) => ErrorKind::ImportError,
            SheetError::InvalidUpdateImports(_) => ErrorKind::InvalidUpdateImports,
            SheetError::ReplayFailed { .. } => ErrorKind::ReplayFailed,
            SheetError::Io(_) => ErrorKind::Io,
            SheetError::Serialization(_) | SheetError::Deserialization(_) => {
                ErrorKind::Serialization
            }
            SheetError::InvalidFormat(_) => ErrorKind::InvalidFormat,
            SheetError::ChecksumMismatch { .. } => ErrorKind::ChecksumMismatch,
            SheetError::Locked => ErrorKind::Locked,
        }
    }

    /// Short title shown above the error in the host.
    pub fn title(&self) -> String {
        match self {
            SheetError::InvalidArg(_) => "Invalid edit".to_string(),
            SheetError::NoColumn { column, .. } => format!("No column {}", column),
            SheetError::NoTable(name) => format!("No dataframe {}", name),
            SheetError::DuplicatedColumn { header, .. } => {
                format!("Column {} already exists", header)
            }
            SheetError::CyclicFormula { .. } => "Circular reference".to_string(),
            SheetError::UnsupportedFunction(name) => format!("Unsupported function {}", name),
            SheetError::OperatorType { operator, .. } => {
                format!("Invalid types for operator {}", operator)
            }
            SheetError::Function { function, .. } => format!("Error in {}", function),
            SheetError::InvalidFormula { .. } => "Invalid formula".to_string(),
            SheetError::InvalidSort { .. } => "Cannot sort column".to_string(),
            SheetError::ColumnInUse { .. } => "Column is referenced by formulas".to_string(),
            SheetError::FileNotFound(_) => "File not found".to_string(),
            SheetError::BadEncoding { .. } => "Unable to decode file".to_string(),
            SheetError::Import(_) => "Import failed".to_string(),
            SheetError::InvalidUpdateImports(_) => "Could not update imports".to_string(),
            SheetError::ReplayFailed { .. } => "Could not replay analysis".to_string(),
            SheetError::Io(_) => "IO error".to_string(),
            SheetError::Serialization(_) | SheetError::Deserialization(_) => {
                "Serialization error".to_string()
            }
            SheetError::InvalidFormat(_) => "Invalid analysis".to_string(),
            SheetError::ChecksumMismatch { .. } => "Corrupted analysis".to_string(),
            SheetError::Locked => "Analysis directory locked".to_string(),
        }
    }

    /// Remediation hint for the user.
    pub fn to_fix(&self) -> String {
        match self {
            SheetError::InvalidArg(message) => message.clone(),
            SheetError::NoColumn { column, table } => format!(
                "{} does not exist in {}. Check the spelling of the column header.",
                column, table
            ),
            SheetError::NoTable(name) => format!("{} does not exist. It may have been deleted.", name),
            SheetError::DuplicatedColumn { header, .. } => {
                format!("Choose a header other than {}.", header)
            }
            SheetError::CyclicFormula { column } => format!(
                "The formula for {} depends on itself. Remove the circular reference.",
                column
            ),
            SheetError::UnsupportedFunction(name) => {
                format!("{} is not a supported function. Check the function name.", name)
            }
            SheetError::OperatorType {
                operator,
                left,
                right,
            } => format!(
                "{} is not defined between a {} and a {}. Change the types of the arguments.",
                operator, left, right
            ),
            SheetError::Function { message, .. } => message.clone(),
            SheetError::InvalidFormula { message, .. } => message.clone(),
            SheetError::InvalidSort { message, .. } => format!(
                "{}. Change the dtype of the column so all values can be compared.",
                message
            ),
            SheetError::ColumnInUse { dependents, .. } => format!(
                "Delete or change the formulas of {} first.",
                dependents.join(", ")
            ),
            SheetError::FileNotFound(path) => {
                format!("Check that {} exists and is readable.", path.display())
            }
            SheetError::BadEncoding { encoding, .. } => {
                format!("Try importing the file with an encoding other than {}.", encoding)
            }
            SheetError::Import(message) => message.clone(),
            SheetError::InvalidUpdateImports(message) => format!(
                "{}. The previous imports were restored.",
                message
            ),
            SheetError::ReplayFailed { message, .. } => format!(
                "{}. The analysis was not applied.",
                message
            ),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for SheetError {
    fn from(e: serde_json::Error) -> Self {
        SheetError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for SheetError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        SheetError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for SheetError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        SheetError::Deserialization(e.to_string())
    }
}

impl From<csv::Error> for SheetError {
    fn from(e: csv::Error) -> Self {
        SheetError::Import(e.to_string())
    }
}

impl From<calamine::Error> for SheetError {
    fn from(e: calamine::Error) -> Self {
        SheetError::Import(e.to_string())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, SheetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags() {
        let err = SheetError::no_column("df1", "A");
        assert_eq!(err.kind().as_str(), "no-column");

        let err = SheetError::operator_type("+", "str", "int");
        assert_eq!(err.kind(), ErrorKind::OperatorTypeError);
        assert!(err.to_fix().contains("str"));
        assert!(err.to_fix().contains("int"));
    }

    #[test]
    fn test_serde_error_maps_to_serialization() {
        let err: SheetError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::Serialization);
    }
}
