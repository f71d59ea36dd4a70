use thiserror::Error;

/// Lightning API errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LightningError {
    /// Network failure, timeout or 5xx from the node API.
    #[error("lightning api unavailable: {0}")]
    Unavailable(String),

    #[error("lightning api rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("malformed lightning api response: {0}")]
    Malformed(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),
}

impl LightningError {
    /// Whether the same request could succeed if issued again.
    pub fn is_transient(&self) -> bool {
        matches!(self, LightningError::Unavailable(_))
    }
}

impl From<reqwest::Error> for LightningError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            LightningError::Malformed(err.to_string())
        } else {
            LightningError::Unavailable(err.to_string())
        }
    }
}
