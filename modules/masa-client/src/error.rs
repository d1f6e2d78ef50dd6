use thiserror::Error;

pub type Result<T> = std::result::Result<T, MasaError>;

#[derive(Debug, Error)]
pub enum MasaError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Search submission rejected: {0}")]
    Submission(String),
}

impl MasaError {
    /// True for failures of the call itself (network, timeout, non-2xx, bad body),
    /// as opposed to a job the API refused to create.
    pub fn is_transport(&self) -> bool {
        !matches!(self, MasaError::Submission(_))
    }
}

impl From<reqwest::Error> for MasaError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            MasaError::Timeout(err.to_string())
        } else {
            MasaError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for MasaError {
    fn from(err: serde_json::Error) -> Self {
        MasaError::Parse(err.to_string())
    }
}
