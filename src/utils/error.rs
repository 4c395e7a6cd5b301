//! Error Handling Module
//!
//! Defines the error type shared by every stage of the batch pipeline.
//! Uses thiserror for ergonomic error definitions.
//!
//! Configuration errors are separate variants so callers can tell a bad run
//! configuration (raised while the pipeline is built) apart from a failing
//! sample fetch (raised while batches are produced).

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for pipeline operations
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Error loading or decoding an image
    #[error("Failed to load image at '{0}': {1}")]
    ImageLoadError(PathBuf, String),

    /// Error with dataset operations
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Training resize mode is not one of the supported modes
    #[error("Unsupported train resize mode '{0}' (expected one of: RandomResizedCrop, ResizeRandomCrop)")]
    UnsupportedResizeMode(String),

    /// Dataset type is not in the registry
    #[error("Unsupported dataset type '{name}' (expected one of: {accepted})")]
    UnsupportedDataset { name: String, accepted: String },

    /// Auto augment policy name does not match a known prefix
    #[error("Unsupported auto augment policy '{0}' (expected a name starting with: ra, ta_wide, aa)")]
    UnsupportedAutoAugment(String),

    /// Interpolation name is not recognized
    #[error("Unsupported interpolation '{0}' (expected one of: nearest, bilinear, bicubic, lanczos)")]
    UnsupportedInterpolation(String),

    /// Shard index outside of [0, num_replicas)
    #[error("Shard rank {rank} out of range for {num_replicas} replicas (expected 0..{num_replicas})")]
    ShardOutOfRange { rank: usize, num_replicas: usize },

    /// Any other invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Batch or target with inconsistent shape
    #[error("Invalid batch: {0}")]
    InvalidBatch(String),

    /// Dataset archive could not be fetched or unpacked
    #[error("Download error: {0}")]
    Download(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl PipelineError {
    /// True for errors raised while validating run configuration
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            PipelineError::UnsupportedResizeMode(_)
                | PipelineError::UnsupportedDataset { .. }
                | PipelineError::UnsupportedAutoAugment(_)
                | PipelineError::UnsupportedInterpolation(_)
                | PipelineError::ShardOutOfRange { .. }
                | PipelineError::Config(_)
        )
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Serialization(err.to_string())
    }
}

/// Convenience Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, msg: &str) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: std::error::Error> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| PipelineError::InvalidInput(format!("{}: {}", msg, e)))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| PipelineError::InvalidInput(format!("{}: {}", f(), e)))
    }
}

impl<T> ResultExt<T> for Option<T> {
    fn context(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| PipelineError::InvalidInput(msg.to_string()))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.ok_or_else(|| PipelineError::InvalidInput(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::Dataset("test error".to_string());
        assert_eq!(format!("{}", err), "Dataset error: test error");
    }

    #[test]
    fn test_image_load_error() {
        let path = PathBuf::from("/path/to/image.jpg");
        let err = PipelineError::ImageLoadError(path, "file not found".to_string());
        assert!(format!("{}", err).contains("image.jpg"));
    }

    #[test]
    fn test_config_errors_name_value_and_accepted_set() {
        let err = PipelineError::UnsupportedResizeMode("Unknown".to_string());
        let msg = err.to_string();
        assert!(msg.contains("Unknown"));
        assert!(msg.contains("RandomResizedCrop"));
        assert!(msg.contains("ResizeRandomCrop"));
        assert!(err.is_config_error());

        let err = PipelineError::ShardOutOfRange {
            rank: 4,
            num_replicas: 4,
        };
        assert!(err.to_string().contains("rank 4"));
        assert!(err.is_config_error());
    }

    #[test]
    fn test_fetch_errors_are_not_config_errors() {
        let err = PipelineError::ImageLoadError(PathBuf::from("x.png"), "corrupt".to_string());
        assert!(!err.is_config_error());
        assert!(!PipelineError::Dataset("gone".to_string()).is_config_error());
    }

    #[test]
    fn test_result_context() {
        let result: std::result::Result<i32, std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"));

        let with_context = result.context("Failed to read file");
        assert!(matches!(with_context, Err(PipelineError::InvalidInput(_))));
    }

    #[test]
    fn test_option_context() {
        let opt: Option<i32> = None;
        let with_context = opt.context("Value was None");
        assert!(with_context.is_err());
    }
}
