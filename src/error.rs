//! Error types for reading, converting and executing sparse matrices.

use std::path::PathBuf;
use thiserror::Error;

/// Problems with the matrix text or with the triples it describes.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FormatError {
    /// The first line is not a `%%MatrixMarket` banner or has the wrong shape.
    #[error("unrecognized banner: {0}")]
    Banner(String),

    /// The banner names a matrix kind this engine does not handle.
    #[error("unsupported matrix type: {0}")]
    Unsupported(String),

    /// The `rows cols nnz` line is missing or malformed.
    #[error("malformed size line {line}: {reason}")]
    SizeLine { line: usize, reason: String },

    /// A coordinate entry could not be parsed.
    #[error("malformed entry on line {line}: {reason}")]
    Entry { line: usize, reason: String },

    /// The file ended before the declared number of entries was read.
    #[error("expected {expected} entries, found {found}")]
    Truncated { expected: usize, found: usize },

    /// A row index is outside `[0, rows)`.
    #[error("row index {row} out of range for {rows} rows")]
    RowOutOfRange { row: usize, rows: usize },

    /// A column index is outside `[0, cols)`.
    #[error("column index {col} out of range for {cols} columns")]
    ColumnOutOfRange { col: usize, cols: usize },

    /// Converters require triples grouped by non-decreasing row.
    #[error("triple {index} has row {row} after row {previous}; input must be sorted by row")]
    UnsortedRows {
        index: usize,
        row: usize,
        previous: usize,
    },

    /// A dimension or offset does not fit the 32-bit device index type.
    #[error("{what} = {value} does not fit a 32-bit device index")]
    TooLarge { what: &'static str, value: usize },
}

/// Error type for the whole conversion and execution pipeline.
#[derive(Debug, Error)]
pub enum SpmvError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Host memory exhaustion while sizing a packed array.
    #[error("failed to allocate {elements} elements for {what}")]
    Allocation { what: &'static str, elements: usize },

    /// No compute device could be found or opened.
    #[error("no compute device available: {0}")]
    BackendUnavailable(String),

    /// Kernel compilation failed; `log` is the backend's build log verbatim.
    #[error("failed to build kernel `{kernel}`:\n{log}")]
    Build { kernel: String, log: String },

    /// Buffer, argument, enqueue or wait failure.
    #[error("{stage} failed: {message}")]
    Dispatch { stage: &'static str, message: String },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl SpmvError {
    pub(crate) fn dispatch(stage: &'static str, message: impl ToString) -> Self {
        SpmvError::Dispatch {
            stage,
            message: message.to_string(),
        }
    }

    /// Maps an error onto the process exit category it terminates with.
    pub fn category(&self) -> ExitCategory {
        match self {
            SpmvError::Format(_) | SpmvError::Io { .. } => ExitCategory::FileError,
            SpmvError::BackendUnavailable(_) => ExitCategory::DeviceDiscoveryError,
            SpmvError::Build { .. } | SpmvError::Dispatch { .. } => {
                ExitCategory::BackendProgramError
            }
            SpmvError::Allocation { .. } | SpmvError::InvalidParameter(_) => {
                ExitCategory::OtherError
            }
        }
    }
}

/// Process outcome categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCategory {
    Success,
    DeviceDiscoveryError,
    BackendProgramError,
    FileError,
    OtherError,
}

impl ExitCategory {
    pub fn code(self) -> u8 {
        match self {
            ExitCategory::Success => 0,
            ExitCategory::DeviceDiscoveryError => 1,
            ExitCategory::BackendProgramError => 2,
            ExitCategory::FileError => 3,
            ExitCategory::OtherError => 4,
        }
    }
}

pub type Result<T> = std::result::Result<T, SpmvError>;
