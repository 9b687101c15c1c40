use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid label selector: {0}")]
    InvalidSelector(String),

    #[error("invalid wall-clock time: {0:?}")]
    InvalidTime(String),

    #[error("invalid base price: {0:?}")]
    InvalidPrice(String),

    #[error("unknown time unit: {0}")]
    UnknownTimeUnit(String),
}

pub type ModelResult<T> = Result<T, ModelError>;
