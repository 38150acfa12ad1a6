use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Sheet '{sheet}' not found. Available sheets: {available:?}")]
    MissingSheet {
        sheet: String,
        available: Vec<String>,
    },

    #[error("Unable to read workbook {path}: {details}")]
    Workbook { path: String, details: String },

    #[error("Invalid layout for dataset '{dataset}': {details}")]
    InvalidLayout { dataset: String, details: String },

    #[error("Invalid column reference '{0}': expected letters A..XFD")]
    InvalidColumn(String),

    #[error("Invalid cell reference '{0}': expected e.g. B13")]
    InvalidCellRef(String),

    #[error("Date calculation error: {0}")]
    DateError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ExtractionError>;
