use std::io;
use thiserror::Error;

/// Task-fatal failures. The `Display` text is what a polling caller sees
/// in the task's `error` field.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Download failed: {0}")]
    Extraction(String),

    #[error("No files were downloaded")]
    NoArtifacts,

    #[error("{context}: {source}")]
    Organization {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to prepare scratch directory: {0}")]
    Scratch(#[source] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Extraction,
    Organization,
}

impl EngineError {
    pub fn organization(context: impl Into<String>, source: io::Error) -> Self {
        EngineError::Organization {
            context: context.into(),
            source,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            EngineError::InvalidRequest(_)
            | EngineError::Extraction(_)
            | EngineError::NoArtifacts => FailureKind::Extraction,
            EngineError::Organization { .. } | EngineError::Scratch(_) => {
                FailureKind::Organization
            }
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
