use rust_decimal::Decimal;
use thiserror::Error;
use ulid::Ulid;

use crate::model::Ms;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("check-out must be after check-in (start {start}, end {end})")]
    InvalidInterval { start: Ms, end: Ms },
    #[error("nightly rate must be positive, got {0}")]
    InvalidRate(Decimal),
    #[error("{0}")]
    Validation(String),
    #[error("room {room} is unavailable for the requested period (reserved by {existing})")]
    Conflict { room: String, existing: Ulid },
    #[error("reservation not found: {0}")]
    NotFound(Ulid),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
}

/// Coarse classification the boundary uses to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    StorageUnavailable,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InvalidInterval { .. }
            | EngineError::InvalidRate(_)
            | EngineError::Validation(_)
            | EngineError::LimitExceeded(_) => ErrorKind::Validation,
            EngineError::Conflict { .. } => ErrorKind::Conflict,
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::StorageUnavailable(_) => ErrorKind::StorageUnavailable,
        }
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }
}
