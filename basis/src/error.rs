use thiserror::Error;

/// Errors raised while reading, caching or placing basis sets.
#[derive(Error, Debug)]
pub enum BasisError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Pickle error: {0}")]
    Pickle(#[from] serde_pickle::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Unknown element '{0}'")]
    UnknownElement(String),
    #[error("Unsupported angular momentum '{0}'")]
    UnsupportedShell(String),
    #[error("No basis functions for element {0}")]
    MissingElement(String),
}

pub type Result<T> = std::result::Result<T, BasisError>;
