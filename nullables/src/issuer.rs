//! Nullable issuer attestation services.

use crate::chain::NullChain;
use async_trait::async_trait;
use avk_crypto::identifier_for;
use avk_issuer::{
    AttestationService, IssuerError, RevealRequest, RevealResponse, RevealStatusQuery,
    SecurityCodeRequest, NO_INCOMPLETE_ATTESTATION,
};
use avk_types::{Address, E164Number, Identifier, Pepper};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

/// Scripted result of one reveal call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RevealOutcome {
    Delivered,
    /// The issuer has not observed its selection yet.
    NotYetSelected,
    /// Any other rejection, with its HTTP status.
    Rejected(u16),
    Unreachable,
}

#[derive(Default)]
struct IssuerState {
    scripted: HashMap<Address, VecDeque<RevealOutcome>>,
    reveals: Vec<Address>,
    status_reports: Vec<Address>,
    lookups: u32,
    outboxes: Vec<mpsc::UnboundedSender<String>>,
}

/// Every issuer's attestation service in one object.
///
/// A delivered reveal sends the issuer's code message to every subscriber,
/// standing in for the SMS that would reach the phone.
pub struct NullIssuer {
    chain: Arc<NullChain>,
    state: Mutex<IssuerState>,
}

impl NullIssuer {
    pub fn new(chain: Arc<NullChain>) -> Self {
        Self {
            chain,
            state: Mutex::new(IssuerState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, IssuerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue outcomes for the next reveals to `issuer`. Unscripted reveals
    /// are delivered.
    pub fn script(&self, issuer: &Address, outcomes: impl IntoIterator<Item = RevealOutcome>) {
        self.lock()
            .scripted
            .entry(issuer.clone())
            .or_default()
            .extend(outcomes);
    }

    /// Messages delivered from now on.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().outboxes.push(tx);
        rx
    }

    /// Issuers revealed to, in call order, including failed attempts.
    pub fn reveals(&self) -> Vec<Address> {
        self.lock().reveals.clone()
    }

    pub fn reveal_count(&self, issuer: &Address) -> usize {
        self.lock().reveals.iter().filter(|a| *a == issuer).count()
    }

    pub fn status_reports(&self) -> Vec<Address> {
        self.lock().status_reports.clone()
    }

    pub fn security_code_lookups(&self) -> u32 {
        self.lock().lookups
    }

    fn identifier(phone: &E164Number, salt: &str) -> Result<Identifier, IssuerError> {
        let pepper = Pepper::new(salt).map_err(|e| IssuerError::Rejected {
            status: 400,
            message: e.to_string(),
        })?;
        Ok(identifier_for(phone, &pepper))
    }

    fn deliver(&self, message: String) {
        self.lock()
            .outboxes
            .retain(|tx| tx.send(message.clone()).is_ok());
    }
}

#[async_trait]
impl AttestationService for NullIssuer {
    async fn reveal(
        &self,
        _service_url: &str,
        request: &RevealRequest,
    ) -> Result<RevealResponse, IssuerError> {
        let outcome = {
            let mut state = self.lock();
            state.reveals.push(request.issuer.clone());
            state
                .scripted
                .get_mut(&request.issuer)
                .and_then(VecDeque::pop_front)
                .unwrap_or(RevealOutcome::Delivered)
        };

        match outcome {
            RevealOutcome::Delivered => {
                let identifier = Self::identifier(&request.phone_number, &request.salt)?;
                let message = if request.security_code_prefix.is_some() {
                    let code =
                        self.chain
                            .security_code(identifier, &request.account, &request.issuer);
                    format!("Your verification code is {code}")
                } else {
                    self.chain
                        .code_message(identifier, &request.account, &request.issuer)
                };
                self.deliver(message);
                Ok(RevealResponse {
                    ok: true,
                    status: 201,
                    body: json!({ "success": true }),
                })
            }
            RevealOutcome::NotYetSelected => Ok(RevealResponse {
                ok: false,
                status: 422,
                body: json!({ "success": false, "error": NO_INCOMPLETE_ATTESTATION }),
            }),
            RevealOutcome::Rejected(status) => Ok(RevealResponse {
                ok: false,
                status,
                body: json!({ "success": false, "error": "rejected" }),
            }),
            RevealOutcome::Unreachable => Err(IssuerError::Network("connection refused".into())),
        }
    }

    async fn reveal_status(
        &self,
        _service_url: &str,
        query: &RevealStatusQuery,
    ) -> Result<RevealResponse, IssuerError> {
        self.lock().status_reports.push(query.issuer.clone());
        Ok(RevealResponse {
            ok: true,
            status: 200,
            body: json!({ "success": true }),
        })
    }

    async fn attestation_for_security_code(
        &self,
        _service_url: &str,
        request: &SecurityCodeRequest,
        _signature: &str,
    ) -> Result<String, IssuerError> {
        self.lock().lookups += 1;
        let identifier = Self::identifier(&request.phone_number, &request.salt)?;
        let expected = self
            .chain
            .security_code(identifier, &request.account, &request.issuer);
        if expected.get(1..) != Some(request.security_code.as_str()) {
            return Err(IssuerError::Rejected {
                status: 404,
                message: "unknown security code".into(),
            });
        }
        Ok(self
            .chain
            .code_deep_link(identifier, &request.account, &request.issuer))
    }
}
