//! Errors raised while parsing the fundamental types.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypesError {
    #[error("invalid account address: {0}")]
    InvalidAddress(String),

    #[error("not an E.164 phone number: {0}")]
    InvalidPhoneNumber(String),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("pepper must not be empty")]
    EmptyPepper,
}
