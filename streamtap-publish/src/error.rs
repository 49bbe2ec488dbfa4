use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publisher must be created inside a tokio runtime")]
    NoRuntime,

    #[error("invalid sink options: {0}")]
    InvalidOptions(String),
}
