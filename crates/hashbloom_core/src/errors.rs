use thiserror::Error;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("Persist: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Truncated filter: {len} bytes, header needs 32")]
    Truncated { len: usize },

    #[error("Bit buffer length mismatch: expected {expected} bytes, found {found}")]
    LengthMismatch { expected: usize, found: usize },

    #[error("Bad header: {0}")]
    BadHeader(String),
}

pub type Result<T> = std::result::Result<T, FilterError>;
