use masa_client::MasaError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RelayError>;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Search submission failed: {0}")]
    Submission(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Job failed with status \"{0}\"")]
    JobFailed(String),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl RelayError {
    /// Errors the cycle scheduler may retry. Configuration problems are only
    /// ever raised at startup.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, RelayError::Config(_))
    }
}

impl From<MasaError> for RelayError {
    fn from(err: MasaError) -> Self {
        match err {
            MasaError::Submission(msg) => RelayError::Submission(msg),
            other => RelayError::Transport(other.to_string()),
        }
    }
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::Persistence(err.to_string())
    }
}
