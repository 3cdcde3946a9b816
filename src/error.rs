// ⚠️ Error taxonomy for the income pipeline
// Fatal errors abort the run; data-quality problems are warnings, not errors

use crate::record::Category;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    /// Input file unreadable, undecodable, or missing required columns
    #[error("Input error: {0}")]
    Input(String),

    /// Fatal validation failure (empty dataset, mandatory category absent)
    #[error("Validation error: {0}")]
    Validation(String),

    /// A metric cannot be computed for a category
    #[error("Insufficient data for {category}: {reason}")]
    InsufficientData { category: Category, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Export error: {0}")]
    Export(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] rust_xlsxwriter::XlsxError),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),
}

impl EtlError {
    pub fn insufficient(category: Category, reason: impl Into<String>) -> Self {
        EtlError::InsufficientData {
            category,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
