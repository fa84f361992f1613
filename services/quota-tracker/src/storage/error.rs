use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record store unreachable: {0}")]
    Unreachable(String),
    #[error("record store request timed out")]
    Timeout,
    #[error("record store rejected request (status {status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("invalid response from record store: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StoreError::Timeout
        } else if err.is_decode() {
            StoreError::InvalidResponse(err.to_string())
        } else {
            StoreError::Unreachable(err.to_string())
        }
    }
}

impl StoreError {
    /// A timed-out write may or may not have landed on the remote side.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, StoreError::Timeout)
    }
}
