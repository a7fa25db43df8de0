use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid timestamp `{0}`")]
    InvalidTimestamp(String),

    #[error("Message text is empty")]
    EmptyMessage,
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
