//! Client for a fee-delegating relay.
//!
//! The relay submits meta-transactions on behalf of a user's wallet and
//! covers gas, subject to per-session quotas. [`RelaySessionClient`] owns one
//! [`Session`], runs every relay capability with bounded per-call retries, and
//! feeds relay errors into the [`QuotaGuard`] circuit breaker.

pub mod api;
pub mod client;
pub mod error;
pub mod http;
pub mod quota;
pub mod session;

pub use api::{
    BlindedPepperRequest, BlindedPepperResponse, CheckSessionResponse, DeployWalletResponse,
    RelayApi, RequestAttestationsRequest, SessionQuota, StartSessionRequest, StartSessionResponse,
};
pub use client::{RelayCollaborators, RelaySessionClient, LOGIN_MESSAGE_PREFIX};
pub use error::{FetchError, RelayError, TxError};
pub use http::HttpRelayClient;
pub use quota::QuotaGuard;
pub use session::{Session, SessionPhase};
