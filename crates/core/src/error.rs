#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unknown media status: '{0}'")]
    UnknownStatus(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
