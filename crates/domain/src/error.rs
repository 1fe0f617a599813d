/// Shared error type used across all SessionKeeper crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("session manager is not running")]
    NotRunning,

    #[error("session manager is already running")]
    AlreadyRunning,

    #[error("config: {0}")]
    Config(String),

    #[error("collaborator {collaborator}: {message}")]
    Collaborator { collaborator: String, message: String },

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
