//! Error types for repository ingestion

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort an ingestion run
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Repository root not found: {}", .0.display())]
    RootNotFound(PathBuf),

    #[error("Repository root is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("I/O error at {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<figment::Error> for IngestError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

/// Errors raised by a single language handler
///
/// These never escape the ingestor: a failing handler is logged and recorded
/// as a warning while the other handlers keep running.
#[derive(Debug, Clone, Error)]
pub enum HandlerError {
    #[error("Regex compilation error: {0}")]
    Regex(#[from] regex::Error),

    #[error("{language} analysis failed: {message}")]
    Analysis { language: String, message: String },
}

pub type Result<T> = std::result::Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_not_found_display() {
        let err = IngestError::RootNotFound(PathBuf::from("/no/such/repo"));
        assert_eq!(err.to_string(), "Repository root not found: /no/such/repo");
    }

    #[test]
    fn test_handler_error_display() {
        let err = HandlerError::Analysis {
            language: "yaml".to_owned(),
            message: "bad document".to_owned(),
        };
        assert_eq!(err.to_string(), "yaml analysis failed: bad document");
    }
}
