use thiserror::Error;

pub type Result<T> = std::result::Result<T, PineconeError>;

#[derive(Debug, Error)]
pub enum PineconeError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for PineconeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            PineconeError::Parse(err.to_string())
        } else {
            PineconeError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for PineconeError {
    fn from(err: serde_json::Error) -> Self {
        PineconeError::Parse(err.to_string())
    }
}
