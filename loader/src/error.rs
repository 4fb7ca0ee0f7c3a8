//! Error types for configuration loading and merge runs.

use std::path::PathBuf;

use ipc_schema_core::SchemaError;
use thiserror::Error;

/// Errors that can occur while loading a run or its fragments.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// File I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed fragment JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed configuration YAML.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The merge engine rejected the input.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Configuration is well-formed YAML but not a usable run.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Failure attributed to one fragment file.
    #[error("{}: {source}", path.display())]
    Fragment {
        path: PathBuf,
        #[source]
        source: Box<LoaderError>,
    },
}

impl LoaderError {
    /// The engine error behind this failure, if any.
    pub fn schema_error(&self) -> Option<&SchemaError> {
        match self {
            Self::Schema(err) => Some(err),
            Self::Fragment { source, .. } => source.schema_error(),
            _ => None,
        }
    }
}

/// Convenience alias for results with [`LoaderError`].
pub type Result<T> = std::result::Result<T, LoaderError>;
