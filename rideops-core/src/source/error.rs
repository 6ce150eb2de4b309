use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("failed to open database at {path}: {source}")]
    OpenDatabase {
        path: PathBuf,
        source: rusqlite::Error,
    },
    #[error("data source path not configured")]
    MissingStore,
    #[error("query task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("data source unavailable: {0}")]
    Unavailable(String),
}

pub type SourceResult<T> = std::result::Result<T, SourceError>;
