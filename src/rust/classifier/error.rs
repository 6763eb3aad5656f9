use std::io;

/// Represents the different types of errors that can occur in the recommendation engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Training data is missing, degenerate or malformed
    #[error("Data error: {0}")]
    DataError(String),
    /// A trained artifact could not be written
    #[error("Persistence error: {0}")]
    PersistenceError(String),
    /// No artifact exists at the configured location
    #[error("Model not found: {0}")]
    ModelNotFound(String),
    /// The artifact was trained against a different feature schema
    #[error("Feature schema mismatch: expected {expected}, found {found}")]
    SchemaMismatch { expected: String, found: String },
    /// The artifact contents do not match the checksum recorded at save time
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
    /// Error occurred while making predictions
    #[error("Prediction error: {0}")]
    PredictionError(String),
    /// Error occurred due to invalid input parameters
    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl EngineError {
    /// Whether this error should put a serving process into fallback-only mode
    /// instead of refusing to start.
    pub fn is_model_unavailable(&self) -> bool {
        matches!(
            self,
            Self::ModelNotFound(_) | Self::SchemaMismatch { .. } | Self::ChecksumMismatch { .. }
        )
    }
}

impl From<csv::Error> for EngineError {
    fn from(err: csv::Error) -> Self {
        EngineError::DataError(err.to_string())
    }
}

impl From<io::Error> for EngineError {
    fn from(err: io::Error) -> Self {
        EngineError::PersistenceError(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::PersistenceError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_unavailable_classification() {
        assert!(EngineError::ModelNotFound("x".into()).is_model_unavailable());
        assert!(EngineError::SchemaMismatch {
            expected: "v2".into(),
            found: "v1".into()
        }
        .is_model_unavailable());
        assert!(!EngineError::DataError("empty".into()).is_model_unavailable());
        assert!(!EngineError::PredictionError("boom".into()).is_model_unavailable());
    }

    #[test]
    fn test_display() {
        let err = EngineError::SchemaMismatch {
            expected: "product-onehot-v1".into(),
            found: "product-ordinal-v0".into(),
        };
        assert_eq!(
            err.to_string(),
            "Feature schema mismatch: expected product-onehot-v1, found product-ordinal-v0"
        );
    }
}
