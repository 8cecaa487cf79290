//! Error taxonomy shared by the pipeline and both binaries.

use std::path::PathBuf;

/// Errors surfaced by the ingest core.
///
/// The CLI maps any of these to exit code 1. `Data` never fails a run on its
/// own (bad records are dropped and counted); it classifies a rejected
/// record.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(#[from] tokio_postgres::Error),

    #[error("source error in {}: {message}", path.display())]
    Source { path: PathBuf, message: String },

    #[error("invalid record: {0}")]
    Data(String),

    #[error("run cancelled")]
    Cancelled,
}

impl IngestError {
    pub fn source(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        IngestError::Source {
            path: path.into(),
            message: message.into(),
        }
    }
}
