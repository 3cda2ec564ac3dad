//! Code intake: turns inbound messages into accepted attestation codes.

use crate::code::{extract_attestation_code, extract_security_code};
use crate::error::CodeIntakeError;
use crate::events::{EventLog, VerificationEvent};
use crate::retriever::InboundMessage;
use avk_chain::{AccountSigner, ChainReader};
use avk_crypto::security_code_prefix;
use avk_issuer::{AttestationService, SecurityCodeRequest};
use avk_types::{ActionableAttestation, Address, AttestationCode, Identifier, E164Number, Pepper};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

/// Accepted codes for one verification attempt.
///
/// Append-only. The intake listener writes; completion tasks wait on it.
#[derive(Clone, Debug)]
pub struct CodeBook {
    tx: Arc<watch::Sender<Vec<AttestationCode>>>,
}

impl Default for CodeBook {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeBook {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Vec::new());
        Self { tx: Arc::new(tx) }
    }

    pub fn codes(&self) -> Vec<AttestationCode> {
        self.tx.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.tx.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_code(&self, code: &str) -> bool {
        self.tx.borrow().iter().any(|c| c.code == code)
    }

    pub fn code_for(&self, issuer: &Address) -> Option<AttestationCode> {
        self.tx.borrow().iter().find(|c| &c.issuer == issuer).cloned()
    }

    /// Append `code` unless the same code string is already present.
    pub fn append(&self, code: AttestationCode) -> bool {
        let mut added = false;
        self.tx.send_modify(|codes| {
            if !codes.iter().any(|c| c.code == code.code) {
                codes.push(code);
                added = true;
            }
        });
        added
    }

    /// The first code accepted for `issuer`, waiting until one arrives.
    pub async fn wait_for_code(&self, issuer: &Address) -> AttestationCode {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(code) = rx.borrow_and_update().iter().find(|c| &c.issuer == issuer) {
                return code.clone();
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// What a code is validated against: the identity being verified and the
/// issuers currently assigned to it.
#[derive(Clone, Debug)]
pub struct IntakeContext {
    pub identifier: Identifier,
    pub account: Address,
    pub phone: E164Number,
    pub pepper: Pepper,
    pub attestations: Vec<ActionableAttestation>,
}

impl IntakeContext {
    fn issuers(&self) -> Vec<Address> {
        self.attestations.iter().map(|a| a.issuer.clone()).collect()
    }
}

/// Validates inbound messages against the chain and appends accepted codes
/// to the [`CodeBook`].
#[derive(Clone)]
pub struct CodeIntake {
    chain: Arc<dyn ChainReader>,
    issuers: Arc<dyn AttestationService>,
    signer: Arc<dyn AccountSigner>,
    book: CodeBook,
    events: EventLog,
    short_codes: bool,
}

impl CodeIntake {
    pub fn new(
        chain: Arc<dyn ChainReader>,
        issuers: Arc<dyn AttestationService>,
        signer: Arc<dyn AccountSigner>,
        book: CodeBook,
        events: EventLog,
        short_codes: bool,
    ) -> Self {
        Self {
            chain,
            issuers,
            signer,
            book,
            events,
            short_codes,
        }
    }

    pub fn book(&self) -> &CodeBook {
        &self.book
    }

    /// Process one message and record the outcome as an event.
    pub async fn handle(&self, ctx: &IntakeContext, inbound: &InboundMessage) {
        let user_submitted = inbound.input_type.is_user_submitted();
        match self.receive(ctx, inbound).await {
            Ok(code) => {
                info!(issuer = %code.issuer, input = %inbound.input_type, "attestation code accepted");
                self.events.push(VerificationEvent::CodeAccepted {
                    issuer: code.issuer,
                    input_type: inbound.input_type,
                });
            }
            Err(e) => {
                if e.is_user_visible(user_submitted) {
                    warn!(error = %e, input = %inbound.input_type, "attestation code rejected");
                    self.events.push(VerificationEvent::CodeRejected {
                        input_type: inbound.input_type,
                        error: e,
                    });
                } else {
                    debug!(error = %e, input = %inbound.input_type, "message dropped");
                }
            }
        }
    }

    /// Extract, de-duplicate, match and validate a code, then append it.
    pub async fn receive(
        &self,
        ctx: &IntakeContext,
        inbound: &InboundMessage,
    ) -> Result<AttestationCode, CodeIntakeError> {
        let message = inbound.message.trim();
        if message.is_empty() {
            return Err(CodeIntakeError::Empty);
        }

        let (code, short_code) = self.extract(ctx, message).await?;
        if self.book.contains_code(&code) {
            return Err(CodeIntakeError::RepeatCode);
        }

        let issuer = self
            .chain
            .find_matching_issuer(&ctx.identifier, &ctx.account, &code, &ctx.issuers())
            .await?
            .ok_or(CodeIntakeError::NoMatchingIssuer)?;
        let valid = self
            .chain
            .validate_attestation_code(&ctx.identifier, &ctx.account, &issuer, &code)
            .await?;
        if !valid {
            return Err(CodeIntakeError::InvalidCode(issuer));
        }

        let accepted = AttestationCode {
            code,
            short_code,
            issuer,
        };
        if !self.book.append(accepted.clone()) {
            return Err(CodeIntakeError::RepeatCode);
        }
        Ok(accepted)
    }

    async fn extract(
        &self,
        ctx: &IntakeContext,
        message: &str,
    ) -> Result<(String, Option<String>), CodeIntakeError> {
        if self.short_codes {
            if let Some(short) = extract_security_code(message) {
                match self.expand_security_code(ctx, &short).await {
                    Ok(code) => return Ok((code, Some(short))),
                    Err(e) => debug!(error = %e, "security code expansion failed, trying full code"),
                }
            }
        }
        extract_attestation_code(message)
            .map(|code| (code, None))
            .ok_or(CodeIntakeError::NoCode)
    }

    /// Ask the issuers the short code's prefix points at for the full code.
    ///
    /// Prefixes are a single digit, so several issuers can share one; each
    /// is asked in turn. Lookups are signed by the connected account key.
    async fn expand_security_code(
        &self,
        ctx: &IntakeContext,
        short: &str,
    ) -> Result<String, CodeIntakeError> {
        let mut chars = short.chars();
        let prefix = chars.next().ok_or(CodeIntakeError::NoCode)?;
        let security_code = chars.as_str();

        let mut last_error = CodeIntakeError::NoMatchingIssuer;
        for attestation in ctx
            .attestations
            .iter()
            .filter(|a| security_code_prefix(&a.issuer) == prefix)
        {
            match self.lookup_security_code(ctx, attestation, security_code).await {
                Ok(code) => return Ok(code),
                Err(e) => {
                    debug!(issuer = %attestation.issuer, error = %e, "security code lookup failed");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    async fn lookup_security_code(
        &self,
        ctx: &IntakeContext,
        attestation: &ActionableAttestation,
        security_code: &str,
    ) -> Result<String, CodeIntakeError> {
        let request = SecurityCodeRequest {
            account: ctx.account.clone(),
            issuer: attestation.issuer.clone(),
            phone_number: ctx.phone.clone(),
            salt: ctx.pepper.as_str().to_string(),
            security_code: security_code.to_string(),
        };
        let body = serde_json::to_vec(&request)
            .map_err(|e| CodeIntakeError::SecurityCode(e.to_string()))?;
        let signature = self
            .signer
            .sign_message(&body)
            .await
            .map_err(|e| CodeIntakeError::SecurityCode(e.to_string()))?;
        let message = self
            .issuers
            .attestation_for_security_code(&attestation.attestation_service_url, &request, &signature)
            .await
            .map_err(|e| CodeIntakeError::SecurityCode(e.to_string()))?;
        extract_attestation_code(&message).ok_or(CodeIntakeError::NoCode)
    }
}

/// Drain `inbound` through `intake` until aborted.
///
/// Holds the receiver lock for its lifetime, so at most one listener runs
/// at a time; aborting the task releases it. The context is read per
/// message, so newly assigned issuers are picked up without a restart.
pub async fn listen(
    intake: CodeIntake,
    contexts: watch::Receiver<IntakeContext>,
    inbound: Arc<Mutex<mpsc::UnboundedReceiver<InboundMessage>>>,
) {
    let mut rx = inbound.lock().await;
    debug!(issuers = contexts.borrow().attestations.len(), "code listener started");
    while let Some(message) = rx.recv().await {
        let ctx = contexts.borrow().clone();
        intake.handle(&ctx, &message).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(issuer: u8, code: &str) -> AttestationCode {
        AttestationCode {
            code: code.to_string(),
            short_code: None,
            issuer: Address::new(format!("0x{issuer:040x}")),
        }
    }

    #[test]
    fn book_rejects_duplicate_code_strings() {
        let book = CodeBook::new();
        assert!(book.append(code(1, "0xaa")));
        assert!(!book.append(code(2, "0xaa")));
        assert!(book.append(code(2, "0xbb")));
        assert_eq!(book.len(), 2);
        assert!(book.contains_code("0xbb"));
    }

    #[tokio::test]
    async fn wait_returns_existing_code() {
        let book = CodeBook::new();
        book.append(code(1, "0xaa"));
        let got = book.wait_for_code(&code(1, "").issuer).await;
        assert_eq!(got.code, "0xaa");
    }

    #[tokio::test]
    async fn wait_wakes_on_append_for_its_issuer() {
        let book = CodeBook::new();
        let waiter = {
            let book = book.clone();
            tokio::spawn(async move { book.wait_for_code(&code(2, "").issuer).await })
        };
        tokio::task::yield_now().await;
        book.append(code(1, "0xaa"));
        book.append(code(2, "0xbb"));
        assert_eq!(waiter.await.unwrap().code, "0xbb");
    }
}
