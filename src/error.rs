use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to hash {file}: {source}")]
    Hash {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
