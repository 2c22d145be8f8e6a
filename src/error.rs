use thiserror::Error;

/// Malformed input caught before any record is built.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("context must contain at least one kind")]
    EmptyContext,
    #[error("context kind '{kind}' has an empty key")]
    EmptyContextKey { kind: String },
    #[error("invalid context kind '{0}'")]
    InvalidKind(String),
    #[error("context kind '{0}' appears more than once")]
    DuplicateKind(String),
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    #[error("invalid flag key: {0}")]
    InvalidFlagKey(String),
    #[error("invalid rollout in flag '{flag}': {message}")]
    InvalidRollout { flag: String, message: String },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Flag store error: {0}")]
    FlagStore(String),
}

impl Error {
    pub fn flag_store<S: Into<String>>(message: S) -> Self {
        Error::FlagStore(message.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
