//! Pre-built [`tracing::Span`] constructors for verification operations.
//!
//! Consistent span names and field sets make it easy to filter and correlate
//! a single attempt's logs across the relay, issuer and chain layers.

use tracing::{info_span, Span};

/// Span covering one full verification attempt for an account.
pub fn verification_span(account: &str, relayed: bool) -> Span {
    info_span!("verification", account = %account, relayed)
}

/// Span covering a single relay API action.
pub fn relay_call_span(action: &str) -> Span {
    info_span!("relay_call", action = %action)
}

/// Span covering one reveal request to an issuer's attestation service.
pub fn reveal_span(issuer: &str) -> Span {
    info_span!("reveal", issuer = %issuer)
}

/// Span covering the completion of one attestation code.
pub fn completion_span(issuer: &str, index: usize) -> Span {
    info_span!("completion", issuer = %issuer, index)
}
