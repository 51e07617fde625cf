use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EditorError {
    #[error("i/o failure on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to load document {path:?}: {reason}")]
    DocumentLoad { path: PathBuf, reason: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("failed to render page: {0}")]
    Render(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    DocumentLoad,
    InvalidArgument,
    Render,
}

impl EditorError {
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn load(path: impl AsRef<Path>, reason: impl ToString) -> Self {
        Self::DocumentLoad {
            path: path.as_ref().to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EditorError::Io { .. } => ErrorKind::Io,
            EditorError::DocumentLoad { .. } => ErrorKind::DocumentLoad,
            EditorError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            EditorError::Render(_) => ErrorKind::Render,
        }
    }
}

pub type Result<T, E = EditorError> = std::result::Result<T, E>;
