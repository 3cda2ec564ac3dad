use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid group element encoding")]
    InvalidPoint,

    #[error("invalid base64 payload: {0}")]
    InvalidEncoding(String),

    #[error("random source unavailable: {0}")]
    Rng(String),

    #[error("degenerate blinding scalar")]
    ZeroScalar,
}
