//! Error types for the fallible edges of the harness: artifact IO and host
//! payload decoding. Analysis, normalization and generation never fail.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    /// The artifact directory could not be created or scanned.
    #[error("[H-ERR-ARTIFACT-001] cannot prepare artifact directory {path}: {source}")]
    ArtifactDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The generated script could not be written.
    #[error("[H-ERR-ARTIFACT-002] cannot write artifact {path}: {source}")]
    ArtifactWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A JSON request from the host did not decode.
    #[error("[H-ERR-PAYLOAD-001] invalid payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

impl HarnessError {
    /// Stable code for hosts that match on failures.
    pub fn code(&self) -> &'static str {
        match self {
            HarnessError::ArtifactDir { .. } => "H-ERR-ARTIFACT-001",
            HarnessError::ArtifactWrite { .. } => "H-ERR-ARTIFACT-002",
            HarnessError::InvalidPayload(_) => "H-ERR-PAYLOAD-001",
        }
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;
