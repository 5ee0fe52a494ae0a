use thiserror::Error;

pub type ProofResult<T> = std::result::Result<T, ProofError>;

/// Precondition violations raised by the locator and the fitter.
///
/// Missing markers and text that does not fit are not errors; both degrade
/// to a usable result instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProofError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ProofError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        ProofError::InvalidInput(message.into())
    }
}
