use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EstuaryError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Never carries the cause, so callers cannot tell a missing user from a bad password.
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Protected: {0}")]
    Protected(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Feed unreachable: {0}")]
    Unreachable(String),

    #[error("Bad feed content: {0}")]
    BadContent(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("{0}")]
    Other(String),
}

impl EstuaryError {
    /// Turns a SQLite unique-constraint failure into `Conflict`, leaving other errors untouched.
    pub fn from_write(err: rusqlite::Error, what: impl Into<String>) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref e, _) if e.code == ErrorCode::ConstraintViolation => {
                EstuaryError::Conflict(what.into())
            }
            other => EstuaryError::Database(other),
        }
    }

    /// Turns `QueryReturnedNoRows` into `NotFound`.
    pub fn from_lookup(err: rusqlite::Error, what: impl Into<String>) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => EstuaryError::NotFound(what.into()),
            other => EstuaryError::Database(other),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, EstuaryError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, EstuaryError>;
