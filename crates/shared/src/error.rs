use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatusDecodeError {
    #[error("status frame is not valid utf-8")]
    NotUtf8,
    #[error("invalid status frame: {0}")]
    InvalidJson(#[from] serde_json::Error),
}
