use thiserror::Error;

/// Errors raised by the catalog, the operation log and the recorder.
#[derive(Debug, Error)]
pub enum LogbookError {
    #[error("file access failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to read spreadsheet: {0}")]
    SheetRead(#[from] calamine::XlsxError),

    #[error("failed to write spreadsheet: {0}")]
    SheetWrite(#[from] rust_xlsxwriter::XlsxError),

    /// A required field is missing or a value is not one of the fixed choices.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    /// The catalog changed under the caller (positional index no longer
    /// points at the expected product, or a designation is taken).
    #[error("{0}")]
    Conflict(String),

    #[error("spreadsheet service error: {0}")]
    Remote(String),

    #[error("invalid service account credentials: {0}")]
    Credentials(String),

    /// Some worksheets of a multi-plot submission were written before a failure.
    #[error("recorded in {written:?} but failed on {failed}: {source}")]
    PartialWrite {
        written: Vec<String>,
        failed: String,
        #[source]
        source: Box<LogbookError>,
    },
}

impl LogbookError {
    pub fn validation(msg: impl Into<String>) -> Self {
        LogbookError::Validation(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, LogbookError>;
