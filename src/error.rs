//! Error taxonomy for the projection engine

use std::path::{Path, PathBuf};

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Bad or missing path, or media the decoders cannot read
    #[error("failed to load media {path:?}: {reason}")]
    MediaLoadFailed { path: PathBuf, reason: String },

    /// The homography for a surface has no solution
    #[error("degenerate transform: {0}")]
    DegenerateTransform(String),

    /// A preset document that is not readable as structured data
    #[error("malformed preset: {0}")]
    MalformedPreset(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn media(path: &Path, reason: impl Into<String>) -> Self {
        Self::MediaLoadFailed {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn degenerate(reason: impl Into<String>) -> Self {
        Self::DegenerateTransform(reason.into())
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedPreset(reason.into())
    }
}
