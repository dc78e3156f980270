use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid scan root: {0}")]
    InvalidRoot(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("scan cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, CoreError>;
