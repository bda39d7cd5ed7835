use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Invalid configuration: keyword lookup depth {0} is not supported (max 1)")]
    UnsupportedDepth(usize),

    /// An index struct references an id the document store cannot resolve.
    #[error("Index corrupted: {0}")]
    Corruption(String),

    #[error("External collaborator failed: {0}")]
    External(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap a failure reported by an embedding/LLM/vector-engine collaborator.
    pub fn external(err: anyhow::Error) -> Self {
        Error::External(format!("{err:#}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
