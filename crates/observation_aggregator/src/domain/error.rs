use thiserror::Error;

/// Reasons a single delivery is rejected before reaching the store.
///
/// Every variant is recoverable: the delivery is settled and the stream continues.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed routing key '{0}': expected '<entity_id>.<suffix>'")]
    MalformedTopic(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("wrong type for field '{0}'")]
    WrongType(&'static str),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

pub type DecodeResult<T> = std::result::Result<T, DecodeError>;
