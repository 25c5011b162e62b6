use thiserror::Error;

#[derive(Debug, Error)]
pub enum FairLendingError {
    #[error("Configuration error: {field}: {reason}")]
    Configuration { field: String, reason: String },

    #[error("Data integrity error at row {row}: {reason}")]
    DataIntegrity { row: usize, reason: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl FairLendingError {
    pub(crate) fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        FairLendingError::Configuration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn integrity(row: usize, reason: impl Into<String>) -> Self {
        FairLendingError::DataIntegrity {
            row,
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for FairLendingError {
    fn from(e: serde_json::Error) -> Self {
        FairLendingError::SerializationError(e.to_string())
    }
}
