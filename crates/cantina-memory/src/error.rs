use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write snapshot to {path}: {source}")]
    Write { path: String, #[source] source: std::io::Error },
}
