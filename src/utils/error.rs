//! Error Handling Module
//!
//! Defines the error taxonomy for checkpoint loading, model adaptation and
//! per-request inference. Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Main error type for plant health inference
#[derive(Error, Debug)]
pub enum PlantHealthError {
    /// The checkpoint could not be parsed as a key -> tensor mapping
    #[error("Checkpoint format error: {0}")]
    CheckpointFormat(String),

    /// No classifier weight tensor left after key normalization
    #[error("Could not find classifier weights in checkpoint")]
    ClassifierNotFound,

    /// A parameter present in both checkpoint and model has a different shape
    #[error("Shape of parameter '{key}' does not match: model expects {expected:?}, checkpoint has {found:?}")]
    ParameterShape {
        key: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    /// Label taxonomy length disagrees with the inferred class count
    #[error("Label taxonomy has {labels} entries but the checkpoint classifier has {classes} classes")]
    ShapeMismatch { labels: usize, classes: usize },

    /// The input image could not be opened or decoded
    #[error("Failed to decode image: {0}")]
    ImageDecode(String),

    /// Invalid per-request input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Error while running the forward pass or reading its output
    #[error("Inference error: {0}")]
    Inference(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl PlantHealthError {
    /// Whether the error only fails the request that raised it.
    ///
    /// Everything else is an initialization error and aborts startup.
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            PlantHealthError::ImageDecode(_)
                | PlantHealthError::InvalidInput(_)
                | PlantHealthError::Inference(_)
        )
    }
}

impl From<serde_json::Error> for PlantHealthError {
    fn from(err: serde_json::Error) -> Self {
        PlantHealthError::Serialization(err.to_string())
    }
}

impl From<image::ImageError> for PlantHealthError {
    fn from(err: image::ImageError) -> Self {
        PlantHealthError::ImageDecode(err.to_string())
    }
}

impl From<candle_core::Error> for PlantHealthError {
    fn from(err: candle_core::Error) -> Self {
        PlantHealthError::CheckpointFormat(err.to_string())
    }
}

/// Convenience Result type for plant health operations
pub type Result<T> = std::result::Result<T, PlantHealthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PlantHealthError::ShapeMismatch {
            labels: 38,
            classes: 39,
        };
        assert_eq!(
            format!("{}", err),
            "Label taxonomy has 38 entries but the checkpoint classifier has 39 classes"
        );
    }

    #[test]
    fn test_request_errors_are_recoverable() {
        assert!(PlantHealthError::ImageDecode("truncated".to_string()).is_request_error());
        assert!(PlantHealthError::InvalidInput("threshold".to_string()).is_request_error());
        assert!(!PlantHealthError::ClassifierNotFound.is_request_error());
        assert!(!PlantHealthError::CheckpointFormat("bad".to_string()).is_request_error());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PlantHealthError = io_err.into();
        assert!(matches!(err, PlantHealthError::Io(_)));
    }
}
