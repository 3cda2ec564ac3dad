//! Issuer attestation-service collaborator.
//!
//! After issuers are selected on chain, the client reveals the plaintext
//! phone number to each issuer's service so it can send a code. The same
//! service answers reveal-status probes and expands short security codes.

pub mod error;
pub mod http;
pub mod service;

pub use error::IssuerError;
pub use http::HttpAttestationService;
pub use service::{
    AttestationService, RevealRequest, RevealResponse, RevealStatusQuery, SecurityCodeRequest,
    NO_INCOMPLETE_ATTESTATION,
};
