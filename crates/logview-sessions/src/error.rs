use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Failures of the session/event engine. None of them are fatal to the
/// process: each one is scoped to a single request or subscription.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Malformed event at line {line}: {source}")]
    Parse {
        line: u64,
        #[source]
        source: serde_json::Error,
    },

    #[error("Live update channel closed")]
    Transport,
}

impl EngineError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        EngineError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn read(path: &Path, source: io::Error) -> Self {
        EngineError::Read {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound { .. })
    }
}
