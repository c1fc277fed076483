use chatdesk_schema::ErrorKind;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Malformed message or missing registry field
    #[error("{0}")]
    BadRequest(String),

    /// Registry name or path already taken
    #[error("{0}")]
    Conflict(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BadRequest(_) => ErrorKind::BadRequest,
            Self::Conflict(_) => ErrorKind::Conflict,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
