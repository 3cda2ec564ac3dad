//! Session-aware relay client used by the verification flow.

use crate::api::{
    BlindedPepperRequest, CheckSessionResponse, DeployWalletResponse, RelayApi,
    RequestAttestationsRequest, StartSessionRequest,
};
use crate::error::{FetchError, RelayError, TxError};
use crate::quota::QuotaGuard;
use crate::session::Session;
use avk_chain::{
    AccountSigner, ChainReader, ContractCall, MetaTransactionSigner, RawTransaction, TxReceipt,
};
use avk_types::{Address, Clock, Identifier, TxHash, VerificationParams};
use avk_utils::spans::relay_call_span;
use avk_utils::{retry, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn, Instrument};

/// Interval between receipt polls for a relayed transaction.
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Prefix of the message signed to prove account ownership at login.
pub const LOGIN_MESSAGE_PREFIX: &str = "relay:login:";

/// Everything the session client talks to.
#[derive(Clone)]
pub struct RelayCollaborators {
    pub api: Arc<dyn RelayApi>,
    pub chain: Arc<dyn ChainReader>,
    pub signer: Arc<dyn AccountSigner>,
    pub meta_signer: Arc<dyn MetaTransactionSigner>,
    pub clock: Arc<dyn Clock>,
}

/// Drives one relay session: bootstrap, wallet deployment, relayed
/// attestation transactions, and error-quota accounting.
pub struct RelaySessionClient {
    deps: RelayCollaborators,
    session: Session,
    guard: QuotaGuard,
    call_policy: RetryPolicy,
    deploy_policy: RetryPolicy,
    receipt_timeout: Duration,
}

impl RelaySessionClient {
    pub fn new(deps: RelayCollaborators, session: Session, params: &VerificationParams) -> Self {
        Self {
            deps,
            session,
            guard: QuotaGuard::from_params(params),
            call_policy: RetryPolicy::immediate(params.relay_call_attempts),
            deploy_policy: RetryPolicy::immediate(params.deploy_wallet_attempts),
            receipt_timeout: params.receipt_timeout(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn into_session(self) -> Session {
        self.session
    }

    /// Whether the error circuit breaker is open.
    pub fn is_quota_exhausted(&self) -> bool {
        self.guard.is_exhausted(&self.session, self.deps.clock.now())
    }

    /// Timestamp a relay-reported error into the session.
    pub fn record_error(&mut self) {
        let now = self.deps.clock.now();
        self.guard.record_error(&mut self.session, now);
    }

    fn track<T>(&mut self, result: Result<T, RelayError>) -> Result<T, RelayError> {
        if let Err(e) = &result {
            debug!(error = %e, "relay error recorded");
            self.record_error();
        }
        result
    }

    fn token(&self) -> Result<String, RelayError> {
        self.session.token.clone().ok_or(RelayError::SessionInvalid)
    }

    /// Liveness probe. Any failure means the relay is down for this attempt.
    pub async fn check_service(&mut self) -> Result<(), RelayError> {
        let result = self
            .deps
            .api
            .check_service()
            .instrument(relay_call_span("checkService"))
            .await
            .map_err(|e| {
                warn!(error = %e, "relay liveness probe failed");
                RelayError::ServiceDown
            });
        self.track(result)
    }

    /// Start a new session, replacing the current one.
    pub async fn start_session(&mut self, captcha_token: &str) -> Result<(), RelayError> {
        let result = self.start_session_inner(captcha_token).await;
        match result {
            Ok(session) => {
                info!("relay session started");
                self.session = session;
                Ok(())
            }
            Err(e) => self.track(Err(e)),
        }
    }

    async fn start_session_inner(&self, captcha_token: &str) -> Result<Session, RelayError> {
        let account = self.deps.signer.address();
        let message = format!("{LOGIN_MESSAGE_PREFIX}{account}");
        let signature = self
            .deps
            .signer
            .sign_message(message.as_bytes())
            .await
            .map_err(|e| RelayError::LoginSignature(e.to_string()))?;

        let request = StartSessionRequest {
            external_account: account,
            captcha_response_token: captcha_token.to_string(),
            signature,
        };
        let response = self
            .deps
            .api
            .start_session(&request)
            .instrument(relay_call_span("startSession"))
            .await
            .map_err(|e| match e {
                FetchError::Unauthorised => RelayError::AuthenticationFailed,
                other => RelayError::Fetch(other),
            })?;

        Ok(Session::started(
            response.token,
            response.callback_url,
            captcha_token.to_string(),
        ))
    }

    /// Refresh quota and wallet address for the current session.
    ///
    /// Idempotent. An unauthorised response means the token is no longer
    /// valid and the session is marked inactive.
    pub async fn check_session(
        &mut self,
        has_cached_pepper: bool,
    ) -> Result<CheckSessionResponse, RelayError> {
        let token = self.token()?;
        let result = self
            .deps
            .api
            .check_session(&token)
            .instrument(relay_call_span("checkSession"))
            .await;
        match result {
            Ok(response) => {
                self.session.apply_check(
                    &response.quota,
                    response.meta_tx_wallet_address.clone(),
                    has_cached_pepper,
                );
                debug!(active = self.session.active, "relay session checked");
                Ok(response)
            }
            Err(FetchError::Unauthorised) => {
                self.session.active = false;
                self.track(Err(RelayError::SessionInvalid))
            }
            Err(e) => self.track(Err(e.into())),
        }
    }

    /// Ask the relay to evaluate a blinded phone number; returns the base64
    /// evaluation.
    pub async fn get_distributed_blinded_pepper(
        &mut self,
        blinded_phone_number: &str,
        client_version: &str,
    ) -> Result<String, RelayError> {
        let token = self.token()?;
        let request = BlindedPepperRequest {
            blinded_phone_number: blinded_phone_number.to_string(),
            client_version: client_version.to_string(),
        };
        let result = self
            .deps
            .api
            .distributed_blinded_pepper(&token, &request)
            .instrument(relay_call_span("distributedBlindedPepper"))
            .await
            .map(|r| r.combined_signature)
            .map_err(RelayError::from);
        self.track(result)
    }

    /// Deploy a meta-transaction wallet pointing at `implementation`.
    ///
    /// Not idempotent at the relay: callers must consult `check_session`
    /// first and reconcile through it when this fails.
    pub async fn deploy_wallet(&mut self, implementation: &Address) -> Result<Address, RelayError> {
        let token = self.token()?;
        let result = retry(
            &self.deploy_policy,
            "deploy_wallet",
            || self.deploy_wallet_once(&token, implementation),
            RelayError::is_transient,
        )
        .instrument(relay_call_span("deployWallet"))
        .await;
        if let Ok(wallet) = &result {
            info!(%wallet, "meta-transaction wallet deployed");
            self.session.wallet_address = Some(wallet.clone());
        }
        self.track(result)
    }

    async fn deploy_wallet_once(
        &self,
        token: &str,
        implementation: &Address,
    ) -> Result<Address, RelayError> {
        match self.deps.api.deploy_wallet(token, implementation).await? {
            DeployWalletResponse::Deployed { wallet_address } => Ok(wallet_address),
            DeployWalletResponse::InProgress {
                tx_hash,
                deployer_address,
            } => {
                let receipt = self.wait_for_successful_receipt(tx_hash).await?;
                let owner = self.deps.signer.address();
                self.deps
                    .chain
                    .deployed_wallet(&deployer_address, &owner, receipt.block_number)
                    .await?
                    .ok_or(RelayError::Tx(TxError::EventNotFound {
                        tx_hash,
                        event: "WalletDeployed",
                    }))
            }
        }
    }

    /// Approve the fee and request `count` attestations in one relayed batch.
    ///
    /// With `include_approval` false only the request is sent.
    pub async fn request_attestations(
        &mut self,
        identifier: &Identifier,
        wallet: &Address,
        count: u32,
        include_approval: bool,
    ) -> Result<TxReceipt, RelayError> {
        let token = self.token()?;
        let result = retry(
            &self.call_policy,
            "request_attestations",
            || self.request_attestations_once(&token, identifier, wallet, count, include_approval),
            RelayError::is_transient,
        )
        .instrument(relay_call_span("requestSubsidisedAttestations"))
        .await;
        self.track(result)
    }

    async fn request_attestations_once(
        &self,
        token: &str,
        identifier: &Identifier,
        wallet: &Address,
        count: u32,
        include_approval: bool,
    ) -> Result<TxReceipt, RelayError> {
        let fee_token = self.deps.chain.attestation_fee_token().await?;
        let (approve, nonce_offset) = if include_approval {
            let call = self.approve_call(&fee_token, count).await?;
            let raw = self
                .deps
                .meta_signer
                .sign_meta_transaction(wallet, &call, 0)
                .await?;
            (Some(raw), 1)
        } else {
            (None, 0)
        };
        let request_call = ContractCall::RequestAttestations {
            identifier: *identifier,
            count,
            fee_token,
        };
        let request = self
            .deps
            .meta_signer
            .sign_meta_transaction(wallet, &request_call, nonce_offset)
            .await?;

        let body = RequestAttestationsRequest {
            identifier: *identifier,
            attestations_requested: count,
            wallet_address: wallet.clone(),
            approve,
            request,
        };
        let tx_hash = self
            .deps
            .api
            .request_subsidised_attestations(token, &body)
            .await?;
        self.wait_for_successful_receipt(tx_hash).await
    }

    async fn approve_call(
        &self,
        fee_token: &Address,
        count: u32,
    ) -> Result<ContractCall, RelayError> {
        let fee = self.deps.chain.attestation_request_fee(fee_token).await?;
        Ok(ContractCall::ApproveAttestationFee {
            fee_token: fee_token.clone(),
            amount: fee.saturating_mul(u128::from(count)),
        })
    }

    /// Approve the attestation fee for `count` requests on its own.
    pub async fn approve_attestations(
        &mut self,
        wallet: &Address,
        count: u32,
    ) -> Result<TxReceipt, RelayError> {
        let fee_token = match self.deps.chain.attestation_fee_token().await {
            Ok(t) => t,
            Err(e) => return self.track(Err(e.into())),
        };
        let call = match self.approve_call(&fee_token, count).await {
            Ok(c) => c,
            Err(e) => return self.track(Err(e)),
        };
        self.submit_meta_transaction(wallet, call).await
    }

    /// Select issuers for the pending request. The caller must already have
    /// waited out the selection window.
    pub async fn select_issuers(
        &mut self,
        identifier: &Identifier,
        wallet: &Address,
    ) -> Result<TxReceipt, RelayError> {
        self.submit_meta_transaction(
            wallet,
            ContractCall::SelectIssuers {
                identifier: *identifier,
            },
        )
        .await
    }

    pub async fn complete_attestation(
        &mut self,
        identifier: &Identifier,
        wallet: &Address,
        issuer: &Address,
        code: &str,
    ) -> Result<TxReceipt, RelayError> {
        self.submit_meta_transaction(
            wallet,
            ContractCall::Complete {
                identifier: *identifier,
                issuer: issuer.clone(),
                code: code.to_string(),
            },
        )
        .await
    }

    /// Sign `call` for `wallet` and have the relay submit it.
    pub async fn submit_meta_transaction(
        &mut self,
        wallet: &Address,
        call: ContractCall,
    ) -> Result<TxReceipt, RelayError> {
        let token = self.token()?;
        let method = call.method();
        let result = retry(
            &self.call_policy,
            method,
            || self.submit_once(&token, wallet, &call),
            RelayError::is_transient,
        )
        .instrument(relay_call_span(method))
        .await;
        self.track(result)
    }

    async fn submit_once(
        &self,
        token: &str,
        wallet: &Address,
        call: &ContractCall,
    ) -> Result<TxReceipt, RelayError> {
        let raw: RawTransaction = self
            .deps
            .meta_signer
            .sign_meta_transaction(wallet, call, 0)
            .await?;
        let tx_hash = self.deps.api.submit_meta_transaction(token, &raw).await?;
        self.wait_for_successful_receipt(tx_hash).await
    }

    async fn wait_for_successful_receipt(&self, tx_hash: TxHash) -> Result<TxReceipt, RelayError> {
        let receipt = self.wait_for_receipt(tx_hash).await?;
        if !receipt.success {
            return Err(TxError::Revert {
                tx_hash,
                reason: String::new(),
            }
            .into());
        }
        Ok(receipt)
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<TxReceipt, RelayError> {
        let deadline = Instant::now() + self.receipt_timeout;
        loop {
            if let Some(receipt) = self.deps.chain.transaction_receipt(&tx_hash).await? {
                return Ok(receipt);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(TxError::Timeout(tx_hash).into());
            }
            // The last read lands on the deadline itself.
            tokio::time::sleep(RECEIPT_POLL_INTERVAL.min(deadline - now)).await;
        }
    }
}
