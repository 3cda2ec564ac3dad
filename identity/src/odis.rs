//! Direct pepper service, used when no relay is involved.

use crate::error::IdentityError;
use crate::source::PepperSource;
use async_trait::async_trait;
use avk_chain::AccountSigner;
use avk_crypto::BlindedMessage;
use avk_relay::FetchError;
use avk_types::Address;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const BLINDED_SALT_PATH: &str = "getBlindedSalt";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlindedSaltRequest {
    account: Address,
    blinded_query_phone_number: String,
    client_version: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlindedSaltResponse {
    combined_signature: String,
}

/// Asks the pepper service directly, authenticating with an account
/// signature over the request body.
pub struct OdisPepperSource {
    http: reqwest::Client,
    base_url: String,
    signer: Arc<dyn AccountSigner>,
}

impl OdisPepperSource {
    pub fn new(
        base_url: impl Into<String>,
        signer: Arc<dyn AccountSigner>,
        timeout: Duration,
    ) -> Result<Self, IdentityError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Network(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            signer,
        })
    }

    fn url(&self) -> String {
        format!("{}/{}", self.base_url, BLINDED_SALT_PATH)
    }
}

#[async_trait]
impl PepperSource for OdisPepperSource {
    async fn blinded_evaluation(
        &mut self,
        blinded: &BlindedMessage,
        client_version: &str,
    ) -> Result<String, IdentityError> {
        let body = BlindedSaltRequest {
            account: self.signer.address(),
            blinded_query_phone_number: blinded.to_base64(),
            client_version: client_version.to_string(),
        };
        let json = serde_json::to_string(&body)
            .map_err(|e| FetchError::Decode(e.to_string()))?;
        let signature = self
            .signer
            .sign_message(json.as_bytes())
            .await
            .map_err(|e| IdentityError::Signing(e.to_string()))?;

        let response = self
            .http
            .post(self.url())
            .header("Authorization", signature)
            .header("Content-Type", "application/json")
            .body(json)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            debug!(%status, "pepper service returned error status");
            return Err(FetchError::from_status(status.as_u16(), message).into());
        }
        let parsed: BlindedSaltResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;
        Ok(parsed.combined_signature)
    }
}
