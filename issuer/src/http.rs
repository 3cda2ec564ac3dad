//! HTTP implementation of [`AttestationService`].

use crate::error::IssuerError;
use crate::service::{
    AttestationService, RevealRequest, RevealResponse, RevealStatusQuery, SecurityCodeRequest,
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

#[derive(Clone)]
pub struct HttpAttestationService {
    http: reqwest::Client,
}

impl HttpAttestationService {
    pub fn new(timeout: Duration) -> Result<Self, IssuerError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| IssuerError::Network(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { http })
    }
}

fn endpoint(service_url: &str, path: &str) -> String {
    format!("{}/{}", service_url.trim_end_matches('/'), path)
}

async fn into_reveal_response(response: reqwest::Response) -> RevealResponse {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let body = serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text));
    RevealResponse {
        ok: status.is_success(),
        status: status.as_u16(),
        body,
    }
}

#[async_trait]
impl AttestationService for HttpAttestationService {
    async fn reveal(
        &self,
        service_url: &str,
        request: &RevealRequest,
    ) -> Result<RevealResponse, IssuerError> {
        let response = self
            .http
            .post(endpoint(service_url, "attestations"))
            .json(request)
            .send()
            .await
            .map_err(|e| IssuerError::Network(e.to_string()))?;
        let out = into_reveal_response(response).await;
        debug!(issuer = %request.issuer, status = out.status, "reveal response");
        Ok(out)
    }

    async fn reveal_status(
        &self,
        service_url: &str,
        query: &RevealStatusQuery,
    ) -> Result<RevealResponse, IssuerError> {
        let response = self
            .http
            .get(endpoint(service_url, "get_attestations"))
            .query(&[
                ("account", query.account.as_str()),
                ("issuer", query.issuer.as_str()),
                ("phoneNumber", query.phone_number.as_str()),
                ("salt", query.salt.as_str()),
            ])
            .send()
            .await
            .map_err(|e| IssuerError::Network(e.to_string()))?;
        Ok(into_reveal_response(response).await)
    }

    async fn attestation_for_security_code(
        &self,
        service_url: &str,
        request: &SecurityCodeRequest,
        signature: &str,
    ) -> Result<String, IssuerError> {
        let response = self
            .http
            .get(endpoint(service_url, "get_attestations"))
            .header("Authentication", signature)
            .query(&[
                ("account", request.account.as_str()),
                ("issuer", request.issuer.as_str()),
                ("phoneNumber", request.phone_number.as_str()),
                ("salt", request.salt.as_str()),
                ("securityCode", request.security_code.as_str()),
            ])
            .send()
            .await
            .map_err(|e| IssuerError::Network(e.to_string()))?;

        let out = into_reveal_response(response).await;
        if !out.ok {
            return Err(IssuerError::Rejected {
                status: out.status,
                message: out.error_message().unwrap_or_default().to_string(),
            });
        }
        out.body
            .get("attestationCode")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| IssuerError::Decode("missing attestationCode".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_trims_trailing_slash() {
        assert_eq!(
            endpoint("https://issuer.example/", "attestations"),
            "https://issuer.example/attestations"
        );
    }
}
