//! Error types for the membench CLI.

use membench::BenchError;
use thiserror::Error;

/// CLI result type alias.
pub type CliResult<T> = Result<T, CliError>;

/// CLI error type.
#[derive(Error, Debug)]
pub enum CliError {
    /// Error raised by the profiler or an engine.
    #[error(transparent)]
    Bench(#[from] BenchError),

    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid command-line argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Report serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Feature not available.
    #[error("Feature not available: {0}. Enable with --features {1}")]
    FeatureNotAvailable(String, String),
}

impl From<toml::ser::Error> for CliError {
    fn from(e: toml::ser::Error) -> Self {
        CliError::Config(e.to_string())
    }
}

impl CliError {
    /// Rewrite a missing-backend error into a hint about the cargo feature.
    pub fn with_feature_hint(self) -> Self {
        match self {
            CliError::Bench(BenchError::BackendUnavailable(reason))
                if reason.contains("feature not enabled") =>
            {
                CliError::FeatureNotAvailable("CUDA backend".to_string(), "cuda".to_string())
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_hint() {
        let err = CliError::from(BenchError::BackendUnavailable(
            "CUDA feature not enabled".to_string(),
        ))
        .with_feature_hint();
        assert_eq!(
            err.to_string(),
            "Feature not available: CUDA backend. Enable with --features cuda"
        );

        let err = CliError::from(BenchError::BackendUnavailable("no CUDA device found".to_string()))
            .with_feature_hint();
        assert_eq!(err.to_string(), "Backend not available: no CUDA device found");
    }
}
