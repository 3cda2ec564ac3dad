use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IssuerError {
    #[error("network error: {0}")]
    Network(String),

    #[error("issuer rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid response: {0}")]
    Decode(String),
}
