//! Relay wire types and the `RelayApi` collaborator trait.

use crate::error::FetchError;
use async_trait::async_trait;
use avk_chain::RawTransaction;
use avk_types::{Address, Identifier, TxHash};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    pub external_account: Address,
    pub captcha_response_token: String,
    pub signature: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionResponse {
    pub token: String,
    #[serde(default)]
    pub callback_url: Option<String>,
}

/// Remaining relay quota per action.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionQuota {
    pub distributed_blinded_pepper: u32,
    pub request_subsidised_attestation: u32,
    pub submit_meta_transaction: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckSessionResponse {
    pub quota: SessionQuota,
    #[serde(default)]
    pub meta_tx_wallet_address: Option<Address>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlindedPepperRequest {
    /// Base64 blinded phone number.
    pub blinded_phone_number: String,
    pub client_version: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlindedPepperResponse {
    /// Base64 evaluation of the blinded phone number.
    pub combined_signature: String,
}

/// Outcome of a deploy request: either the wallet already exists or a
/// deployment transaction is in flight.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum DeployWalletResponse {
    #[serde(rename_all = "camelCase")]
    Deployed { wallet_address: Address },
    #[serde(rename_all = "camelCase")]
    InProgress {
        tx_hash: TxHash,
        deployer_address: Address,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestAttestationsRequest {
    pub identifier: Identifier,
    pub attestations_requested: u32,
    pub wallet_address: Address,
    /// Approve-then-request batch; approval is omitted when already granted.
    pub approve: Option<RawTransaction>,
    pub request: RawTransaction,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxHashResponse {
    pub tx_hash: TxHash,
}

/// HTTP API of the fee-delegating relay.
///
/// Every call returns a tagged result; the session client decides how to
/// branch on each error kind. Calls other than `check_service` and
/// `start_session` require a session token.
#[async_trait]
pub trait RelayApi: Send + Sync {
    async fn check_service(&self) -> Result<(), FetchError>;

    async fn start_session(
        &self,
        request: &StartSessionRequest,
    ) -> Result<StartSessionResponse, FetchError>;

    async fn check_session(&self, token: &str) -> Result<CheckSessionResponse, FetchError>;

    async fn distributed_blinded_pepper(
        &self,
        token: &str,
        request: &BlindedPepperRequest,
    ) -> Result<BlindedPepperResponse, FetchError>;

    async fn deploy_wallet(
        &self,
        token: &str,
        implementation: &Address,
    ) -> Result<DeployWalletResponse, FetchError>;

    async fn request_subsidised_attestations(
        &self,
        token: &str,
        request: &RequestAttestationsRequest,
    ) -> Result<TxHash, FetchError>;

    async fn submit_meta_transaction(
        &self,
        token: &str,
        tx: &RawTransaction,
    ) -> Result<TxHash, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deploy_response_tags() {
        let json = r#"{"status":"deployed","walletAddress":"0x00000000000000000000000000000000000000aa"}"#;
        let parsed: DeployWalletResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(parsed, DeployWalletResponse::Deployed { .. }));
    }

    #[test]
    fn check_session_tolerates_missing_wallet() {
        let json = r#"{"quota":{"distributedBlindedPepper":1,"requestSubsidisedAttestation":0,"submitMetaTransaction":5}}"#;
        let parsed: CheckSessionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.meta_tx_wallet_address, None);
        assert_eq!(parsed.quota.request_subsidised_attestation, 0);
    }
}
