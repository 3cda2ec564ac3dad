//! Request and response shapes of the attestation service, and its trait.

use crate::error::IssuerError;
use async_trait::async_trait;
use avk_types::{Address, E164Number};
use serde::{Deserialize, Serialize};

/// Error text returned while the issuer has not yet seen its selection.
pub const NO_INCOMPLETE_ATTESTATION: &str = "No incomplete attestation found";

/// Body of a reveal: asks the issuer to deliver a code to `phone_number`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealRequest {
    pub account: Address,
    pub issuer: Address,
    pub phone_number: E164Number,
    /// The pepper, under the field name the service expects.
    pub salt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sms_retriever_app_sig: Option<String>,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_code_prefix: Option<String>,
}

/// Raw outcome of a service call: HTTP success flag, status and JSON body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RevealResponse {
    pub ok: bool,
    pub status: u16,
    pub body: serde_json::Value,
}

impl RevealResponse {
    /// The `error` field of the body, if any.
    pub fn error_message(&self) -> Option<&str> {
        self.body.get("error").and_then(|e| e.as_str())
    }

    /// The issuer has not yet observed the selection transaction.
    pub fn is_not_yet_selected(&self) -> bool {
        self.error_message()
            .is_some_and(|m| m.contains(NO_INCOMPLETE_ATTESTATION))
    }
}

/// Query for the status of an earlier reveal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealStatusQuery {
    pub account: Address,
    pub issuer: Address,
    pub phone_number: E164Number,
    pub salt: String,
}

/// Query expanding a security code into the full attestation message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityCodeRequest {
    pub account: Address,
    pub issuer: Address,
    pub phone_number: E164Number,
    pub salt: String,
    /// The code without its issuer prefix.
    pub security_code: String,
}

/// An issuer's off-chain attestation service, addressed by base URL.
#[async_trait]
pub trait AttestationService: Send + Sync {
    async fn reveal(
        &self,
        service_url: &str,
        request: &RevealRequest,
    ) -> Result<RevealResponse, IssuerError>;

    /// Observability probe: what the issuer knows about an earlier reveal.
    async fn reveal_status(
        &self,
        service_url: &str,
        query: &RevealStatusQuery,
    ) -> Result<RevealResponse, IssuerError>;

    /// The attestation message (typically a deep link) for a security code.
    /// `signature` proves the caller controls `request.account`.
    async fn attestation_for_security_code(
        &self,
        service_url: &str,
        request: &SecurityCodeRequest,
        signature: &str,
    ) -> Result<String, IssuerError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reveal_body_uses_service_field_names() {
        let req = RevealRequest {
            account: Address::new("0x00000000000000000000000000000000000000aa"),
            issuer: Address::new("0x00000000000000000000000000000000000000bb"),
            phone_number: E164Number::parse("+14155550000").unwrap(),
            salt: "piWqRHHYWtfg9".into(),
            sms_retriever_app_sig: None,
            language: "en".into(),
            security_code_prefix: Some("7".into()),
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["phoneNumber"], "+14155550000");
        assert_eq!(v["securityCodePrefix"], "7");
        assert!(v.get("smsRetrieverAppSig").is_none());
    }

    #[test]
    fn detects_not_yet_selected() {
        let r = RevealResponse {
            ok: false,
            status: 422,
            body: json!({ "success": false, "error": "No incomplete attestation found" }),
        };
        assert!(r.is_not_yet_selected());
        let r = RevealResponse {
            ok: false,
            status: 500,
            body: json!({ "error": "boom" }),
        };
        assert!(!r.is_not_yet_selected());
    }
}
