//! HTTP implementation of [`RelayApi`].

use crate::api::{
    BlindedPepperRequest, BlindedPepperResponse, CheckSessionResponse, DeployWalletResponse,
    RelayApi, RequestAttestationsRequest, StartSessionRequest, StartSessionResponse,
    TxHashResponse,
};
use crate::error::FetchError;
use async_trait::async_trait;
use avk_chain::RawTransaction;
use avk_types::{Address, TxHash};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Relay client over `reqwest`, targeting `<base_url>/v1/<action>`.
#[derive(Clone)]
pub struct HttpRelayClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpRelayClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| FetchError::Network(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, action: &str) -> String {
        format!("{}/v1/{}", self.base_url, action)
    }

    async fn exec<T: DeserializeOwned>(
        &self,
        action: &str,
        request: RequestBuilder,
    ) -> Result<T, FetchError> {
        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Network(format!("{action}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            debug!(action, %status, "relay returned error status");
            return Err(map_status(status, message));
        }

        response
            .json()
            .await
            .map_err(|e| FetchError::Decode(format!("{action}: {e}")))
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        action: &str,
        token: Option<&str>,
        body: &B,
    ) -> Result<T, FetchError> {
        let mut req = self.http.post(self.url(action)).json(body);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        self.exec(action, req).await
    }

    async fn get<T: DeserializeOwned>(
        &self,
        action: &str,
        token: Option<&str>,
    ) -> Result<T, FetchError> {
        let mut req = self.http.get(self.url(action));
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        self.exec(action, req).await
    }
}

fn map_status(status: StatusCode, message: String) -> FetchError {
    FetchError::from_status(status.as_u16(), message)
}

#[async_trait]
impl RelayApi for HttpRelayClient {
    async fn check_service(&self) -> Result<(), FetchError> {
        let response = self
            .http
            .get(self.url("ready"))
            .send()
            .await
            .map_err(|e| FetchError::Network(format!("ready: {e}")))?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(map_status(status, response.text().await.unwrap_or_default()))
    }

    async fn start_session(
        &self,
        request: &StartSessionRequest,
    ) -> Result<StartSessionResponse, FetchError> {
        self.post("startSession", None, request).await
    }

    async fn check_session(&self, token: &str) -> Result<CheckSessionResponse, FetchError> {
        self.get("checkSession", Some(token)).await
    }

    async fn distributed_blinded_pepper(
        &self,
        token: &str,
        request: &BlindedPepperRequest,
    ) -> Result<BlindedPepperResponse, FetchError> {
        self.post("distributedBlindedPepper", Some(token), request)
            .await
    }

    async fn deploy_wallet(
        &self,
        token: &str,
        implementation: &Address,
    ) -> Result<DeployWalletResponse, FetchError> {
        let body = serde_json::json!({ "implementationAddress": implementation });
        self.post("deployWallet", Some(token), &body).await
    }

    async fn request_subsidised_attestations(
        &self,
        token: &str,
        request: &RequestAttestationsRequest,
    ) -> Result<TxHash, FetchError> {
        let resp: TxHashResponse = self
            .post("requestSubsidisedAttestations", Some(token), request)
            .await?;
        Ok(resp.tx_hash)
    }

    async fn submit_meta_transaction(
        &self,
        token: &str,
        tx: &RawTransaction,
    ) -> Result<TxHash, FetchError> {
        let resp: TxHashResponse = self.post("submitMetaTransaction", Some(token), tx).await?;
        Ok(resp.tx_hash)
    }
}
