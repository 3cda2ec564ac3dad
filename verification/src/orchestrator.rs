//! Verification orchestrator: drives one phone number from session bootstrap
//! to a verified, registered account.
//!
//! A run races four outcomes: the flow itself, a cancel signal, a restart
//! signal and the overall deadline. Whichever finishes first wins; the flow
//! future is dropped and every background listener is aborted before `run`
//! returns. A restart re-enters the flow at the status refresh, keeping the
//! resolved identity and wallet so nothing is deployed or requested twice.

use crate::backend::{AttestationBackend, DirectBackend, RelayedBackend};
use crate::config::VerificationConfig;
use crate::error::VerificationError;
use crate::events::{EventLog, VerificationEvent};
use crate::intake::{listen, CodeBook, CodeIntake, IntakeContext};
use crate::retriever::{CodeRetriever, CodeSink, InboundMessage};
use crate::signals::{next_signal, ControlSignal, VerificationControl};
use crate::snapshot::{VerificationSnapshot, SNAPSHOT_VERSION};
use avk_chain::{
    verified_wallets, verify_wallet, AccountSigner, AttestationDirectory, ChainReader,
    MetaTransactionSigner, TransactionSender,
};
use avk_crypto::security_code_prefix;
use avk_identity::{
    IdentifierResolver, OdisPepperSource, PepperCache, PepperSource, PhoneIdentity,
    RelayPepperSource,
};
use avk_issuer::{AttestationService, HttpAttestationService, RevealRequest, RevealStatusQuery};
use avk_relay::{
    HttpRelayClient, RelayApi, RelayCollaborators, RelayError, RelaySessionClient, Session,
};
use avk_types::{
    ActionableAttestation, Address, AttestationCode, AttestationsStatus, Clock, CodeInputType,
    E164Number, Identifier, SystemClock, Timestamp, VerificationStatus,
};
use avk_utils::spans::{completion_span, reveal_span, verification_span};
use avk_utils::{format_duration, RetryPolicy};
use futures_util::future::{join_all, try_join_all};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

/// Everything the orchestrator talks to.
pub struct Collaborators {
    pub chain: Arc<dyn ChainReader>,
    pub sender: Arc<dyn TransactionSender>,
    pub signer: Arc<dyn AccountSigner>,
    pub meta_signer: Arc<dyn MetaTransactionSigner>,
    pub issuers: Arc<dyn AttestationService>,
    pub pepper_cache: Arc<dyn PepperCache>,
    pub clock: Arc<dyn Clock>,
    /// Fee-delegating relay. Without one every run takes the direct path.
    pub relay: Option<Arc<dyn RelayApi>>,
    /// Pepper service for the direct path, also used when a run falls back
    /// from the relay. Without one the direct path only works with a cached
    /// pepper.
    pub pepper_source: Option<Box<dyn PepperSource>>,
    /// Platform auto-read listener spawned alongside code intake.
    pub retriever: Option<Arc<dyn CodeRetriever>>,
}

impl Collaborators {
    /// HTTP-backed relay, issuer and pepper clients built from `config`,
    /// around the host's chain client, signers and cache.
    pub fn from_config(
        config: &VerificationConfig,
        chain: Arc<dyn ChainReader>,
        sender: Arc<dyn TransactionSender>,
        signer: Arc<dyn AccountSigner>,
        meta_signer: Arc<dyn MetaTransactionSigner>,
        pepper_cache: Arc<dyn PepperCache>,
    ) -> Result<Self, VerificationError> {
        let timeout = config.relay_request_timeout();
        let relay: Option<Arc<dyn RelayApi>> = if config.use_relay {
            let client = HttpRelayClient::new(config.relay_url.as_str(), timeout)
                .map_err(|e| VerificationError::Config(e.to_string()))?;
            Some(Arc::new(client))
        } else {
            None
        };
        let pepper_source = OdisPepperSource::new(config.odis_url.as_str(), signer.clone(), timeout)?;
        Ok(Self {
            chain,
            sender,
            signer,
            meta_signer,
            issuers: Arc::new(HttpAttestationService::new(timeout)?),
            pepper_cache,
            clock: Arc::new(SystemClock),
            relay,
            pepper_source: Some(Box::new(pepper_source)),
            retriever: None,
        })
    }
}

/// Identity and account a run attests, fixed once prepping succeeds.
#[derive(Clone, Debug)]
struct Prepared {
    identity: PhoneIdentity,
    /// The signer on the direct path, the meta-transaction wallet on the
    /// relayed one.
    account: Address,
    /// Already verified; only registration is left.
    verified: bool,
    /// Relay calls can be made. False on the direct path, including after a
    /// fallback from the relay.
    relayed: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Entry {
    Start,
    Refresh,
}

enum Outcome {
    Signal(ControlSignal),
    TimedOut,
    Finished(Result<(), VerificationError>),
}

/// Drives verification attempts for one phone number and signer.
pub struct VerificationOrchestrator {
    config: VerificationConfig,
    phone: E164Number,
    deps: Collaborators,
    directory: AttestationDirectory,
    resolver: IdentifierResolver,
    relay: Option<RelaySessionClient>,
    status: watch::Sender<VerificationStatus>,
    events: EventLog,
    control: VerificationControl,
    inbound_tx: mpsc::UnboundedSender<InboundMessage>,
    inbound_rx: Arc<Mutex<mpsc::UnboundedReceiver<InboundMessage>>>,
    listener: Option<JoinHandle<()>>,
    intake_context: Option<watch::Sender<IntakeContext>>,
    retriever_task: Option<JoinHandle<()>>,
    book: CodeBook,
    captcha_token: Option<String>,
    prepared: Option<Prepared>,
    actionable: Vec<ActionableAttestation>,
    verified_wallet: Option<Address>,
    last_reveal_attempt: Option<Timestamp>,
}

impl VerificationOrchestrator {
    pub fn new(config: VerificationConfig, phone: E164Number, deps: Collaborators) -> Self {
        Self::with_session(config, phone, deps, Session::default())
    }

    /// Resume from a snapshot taken by [`Self::snapshot`].
    pub fn restore(
        config: VerificationConfig,
        phone: E164Number,
        deps: Collaborators,
        snapshot: VerificationSnapshot,
    ) -> Self {
        let mut orchestrator = Self::with_session(config, phone, deps, snapshot.session);
        orchestrator.status.send_replace(snapshot.status);
        orchestrator.actionable = snapshot.actionable;
        orchestrator.verified_wallet = snapshot.verified_wallet;
        orchestrator.last_reveal_attempt = snapshot.last_reveal_attempt;
        orchestrator
    }

    fn with_session(
        config: VerificationConfig,
        phone: E164Number,
        deps: Collaborators,
        session: Session,
    ) -> Self {
        let params = &config.params;
        let directory = AttestationDirectory::new(deps.chain.clone(), params);
        let resolver = IdentifierResolver::new(deps.pepper_cache.clone(), config.client_version.clone());
        let relay = match (&deps.relay, config.use_relay) {
            (Some(api), true) => Some(RelaySessionClient::new(
                RelayCollaborators {
                    api: api.clone(),
                    chain: deps.chain.clone(),
                    signer: deps.signer.clone(),
                    meta_signer: deps.meta_signer.clone(),
                    clock: deps.clock.clone(),
                },
                session,
                params,
            )),
            _ => None,
        };
        let (status, _) = watch::channel(VerificationStatus::Idle);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        Self {
            config,
            phone,
            deps,
            directory,
            resolver,
            relay,
            status,
            events: EventLog::new(),
            control: VerificationControl::new(),
            inbound_tx,
            inbound_rx: Arc::new(Mutex::new(inbound_rx)),
            listener: None,
            intake_context: None,
            retriever_task: None,
            book: CodeBook::new(),
            captcha_token: None,
            prepared: None,
            actionable: Vec::new(),
            verified_wallet: None,
            last_reveal_attempt: None,
        }
    }

    // ── Host-facing accessors ────────────────────────────────────────────

    pub fn status(&self) -> VerificationStatus {
        *self.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<VerificationStatus> {
        self.status.subscribe()
    }

    /// Handle for cancelling or restarting a run from another task.
    pub fn control(&self) -> VerificationControl {
        self.control.clone()
    }

    /// Where push handlers, deep links and manual entry deliver messages.
    pub fn code_sink(&self) -> CodeSink {
        CodeSink::new(self.inbound_tx.clone())
    }

    /// Queue one inbound message for code intake.
    pub fn receive(&self, message: impl Into<String>, input_type: CodeInputType) -> bool {
        self.code_sink().deliver(message, input_type)
    }

    /// Captcha for the next relay session start. Consumed by that start.
    pub fn set_captcha_token(&mut self, token: impl Into<String>) {
        self.captcha_token = Some(token.into());
    }

    pub fn drain_events(&self) -> Vec<VerificationEvent> {
        self.events.drain()
    }

    pub fn accepted_codes(&self) -> Vec<AttestationCode> {
        self.book.codes()
    }

    pub fn verified_wallet(&self) -> Option<&Address> {
        self.verified_wallet.as_ref()
    }

    pub fn session(&self) -> Option<&Session> {
        self.relay.as_ref().map(RelaySessionClient::session)
    }

    /// Whether the current or next run goes through the relay. False once a
    /// run has fallen back to the direct path.
    pub fn is_relayed(&self) -> bool {
        match &self.prepared {
            Some(prepared) => prepared.relayed,
            None => self.relay.is_some(),
        }
    }

    pub fn snapshot(&self) -> VerificationSnapshot {
        VerificationSnapshot {
            version: SNAPSHOT_VERSION,
            session: self.session().cloned().unwrap_or_default(),
            status: self.status(),
            actionable: self.actionable.clone(),
            verified_wallet: self.verified_wallet.clone(),
            last_reveal_attempt: self.last_reveal_attempt,
        }
    }

    fn set_status(&self, status: VerificationStatus) {
        let previous = self.status.send_replace(status);
        if previous != status {
            info!(%status, "verification status changed");
            self.events.push(VerificationEvent::StatusChanged(status));
        }
    }

    // ── Run control ──────────────────────────────────────────────────────

    /// Run one verification attempt to a terminal status.
    ///
    /// With `without_revealing` no reveals or new requests are made; codes
    /// already sent out by issuers are still awaited and completed.
    pub async fn run(&mut self, without_revealing: bool) -> Result<(), VerificationError> {
        let span = verification_span(self.deps.signer.address().as_str(), self.relay.is_some());
        self.race(without_revealing).instrument(span).await
    }

    async fn race(&mut self, without_revealing: bool) -> Result<(), VerificationError> {
        let mut signals = self.control.subscribe();
        let timeout = self.config.params.verification_timeout();
        let deadline = tokio::time::Instant::now() + timeout;
        self.book = CodeBook::new();
        self.prepared = None;
        let mut entry = Entry::Start;

        loop {
            let outcome = tokio::select! {
                biased;
                signal = next_signal(&mut signals) => Outcome::Signal(signal),
                _ = tokio::time::sleep_until(deadline) => Outcome::TimedOut,
                result = self.flow(entry, without_revealing) => Outcome::Finished(result),
            };
            self.teardown();

            match outcome {
                Outcome::Signal(ControlSignal::Restart) => {
                    info!("restart requested, refreshing attestation state");
                    entry = Entry::Refresh;
                }
                Outcome::Signal(ControlSignal::Cancel) => {
                    info!("verification cancelled");
                    self.report_reveal_statuses().await;
                    self.set_status(VerificationStatus::Stopped);
                    return Err(VerificationError::Cancelled);
                }
                Outcome::TimedOut => {
                    let err = VerificationError::Timeout(format_duration(timeout.as_secs()));
                    return Err(self.fail(err).await);
                }
                Outcome::Finished(Ok(())) => {
                    self.set_status(VerificationStatus::Done);
                    return Ok(());
                }
                Outcome::Finished(Err(err)) => return Err(self.fail(err).await),
            }
        }
    }

    async fn fail(&mut self, err: VerificationError) -> VerificationError {
        if matches!(err, VerificationError::MultipleVerifiedWallets(_)) {
            error!(error = %err, "invariant violated: refusing to pick a verified wallet");
        } else {
            warn!(error = %err, "verification failed");
        }
        self.report_reveal_statuses().await;
        self.events.push(VerificationEvent::Failed {
            message: err.to_string(),
        });
        self.set_status(err.status());
        err
    }

    /// Abort the intake listener and the platform retriever.
    fn teardown(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        self.intake_context = None;
        if let Some(retriever) = self.retriever_task.take() {
            retriever.abort();
        }
    }

    async fn flow(&mut self, entry: Entry, without_revealing: bool) -> Result<(), VerificationError> {
        let prepared = match (entry, self.prepared.clone()) {
            (Entry::Refresh, Some(prepared)) => {
                if prepared.relayed {
                    self.bootstrap_session().await?;
                }
                prepared
            }
            _ => {
                self.set_status(VerificationStatus::Prepping);
                let prepared = self.prepare().await?;
                self.prepared = Some(prepared.clone());
                prepared
            }
        };

        if !prepared.verified {
            self.set_status(VerificationStatus::GettingStatus);
            let status = self
                .directory
                .get_attestations_status(&prepared.account, &prepared.identity.identifier)
                .await?;
            debug!(
                remaining = status.num_attestations_remaining,
                completed = status.completed,
                total = status.total,
                "attestation status"
            );
            if !status.is_verified {
                self.attest(&prepared, status, without_revealing).await?;
            }
        }
        self.finalize(&prepared).await
    }

    // ── Prepping ─────────────────────────────────────────────────────────

    async fn prepare(&mut self) -> Result<Prepared, VerificationError> {
        if self.relay.is_some() {
            self.prepare_relayed().await
        } else {
            self.prepare_direct().await
        }
    }

    async fn prepare_direct(&mut self) -> Result<Prepared, VerificationError> {
        let identity = match self.deps.pepper_source.as_deref_mut() {
            Some(source) => self.resolver.resolve(&self.phone, source).await?,
            None => self.resolver.resolve_cached(&self.phone)?,
        };
        Ok(Prepared {
            identity,
            account: self.deps.signer.address(),
            verified: false,
            relayed: false,
        })
    }

    async fn prepare_relayed(&mut self) -> Result<Prepared, VerificationError> {
        let signer = self.deps.signer.address();
        let allowed = self.config.allowed_implementations();

        if let Err(e) = self.check_relay_ready().await {
            warn!(error = %e, "relay not ready, looking for an existing verified wallet");
            if let Ok(identity) = self.resolver.resolve_cached(&self.phone) {
                if let Some(wallet) = self.single_verified_wallet(&identity, &allowed).await? {
                    return Ok(Prepared {
                        identity,
                        account: wallet,
                        verified: true,
                        relayed: false,
                    });
                }
            }
            return self.fall_back_to_direct(VerificationError::RelayNotReady(e)).await;
        }

        self.bootstrap_session().await?;

        let identity = {
            let client = self.relay.as_mut().ok_or(RelayError::SessionInvalid)?;
            let mut source = RelayPepperSource::new(client);
            self.resolver.resolve(&self.phone, &mut source).await?
        };

        if let Some(wallet) = self.single_verified_wallet(&identity, &allowed).await? {
            return Ok(Prepared {
                identity,
                account: wallet,
                verified: true,
                relayed: true,
            });
        }

        let wallet = match self.ensure_wallet().await {
            Ok(wallet) => verify_wallet(self.directory.chain().as_ref(), &wallet, &allowed, &signer)
                .await
                .map(|()| wallet)
                .map_err(VerificationError::from),
            Err(e) => Err(e),
        };
        match wallet {
            Ok(wallet) => Ok(Prepared {
                identity,
                account: wallet,
                verified: false,
                relayed: true,
            }),
            Err(e @ VerificationError::InvalidWallet(_)) => self.fall_back_to_direct(e).await,
            Err(e) => Err(e),
        }
    }

    /// Continue the run on the direct path after the relay could not be used.
    ///
    /// Fails with `reason` when the direct path has no way to resolve the
    /// identifier either.
    async fn fall_back_to_direct(
        &mut self,
        reason: VerificationError,
    ) -> Result<Prepared, VerificationError> {
        if self.deps.pepper_source.is_none() && !self.resolver.has_cached_pepper(&self.phone) {
            return Err(reason);
        }
        warn!(error = %reason, "falling back to direct verification");
        self.events.push(VerificationEvent::RelayBypassed {
            reason: reason.to_string(),
        });
        self.prepare_direct().await
    }

    /// The one verified wallet of this signer for `identity`, if any.
    async fn single_verified_wallet(
        &self,
        identity: &PhoneIdentity,
        allowed: &[Address],
    ) -> Result<Option<Address>, VerificationError> {
        let signer = self.deps.signer.address();
        let mut wallets =
            verified_wallets(&self.directory, &identity.identifier, allowed, &signer).await?;
        match wallets.len() {
            0 => Ok(None),
            1 => {
                let wallet = wallets.remove(0);
                info!(%wallet, "found wallet verified in an earlier attempt");
                self.events.push(VerificationEvent::VerifiedWalletFound {
                    wallet: wallet.clone(),
                });
                Ok(Some(wallet))
            }
            _ => Err(VerificationError::MultipleVerifiedWallets(wallets)),
        }
    }

    /// Relay liveness with exponential backoff, then the error budget.
    async fn check_relay_ready(&mut self) -> Result<(), RelayError> {
        let params = &self.config.params;
        let policy = RetryPolicy::exponential(params.readiness_retries, params.readiness_backoff());
        let client = self.relay.as_mut().ok_or(RelayError::SessionInvalid)?;

        if client.is_quota_exhausted() {
            return Err(RelayError::ErrorQuotaExceeded);
        }
        let max = policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match client.check_service().await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < max => {
                    let delay = policy.delay_after(attempt);
                    debug!(attempt, error = %e, ?delay, "relay probe failed, backing off");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Make sure the relay session is active, starting a new one if needed.
    async fn bootstrap_session(&mut self) -> Result<(), VerificationError> {
        let has_cached_pepper = self.resolver.has_cached_pepper(&self.phone);
        let max = self.config.params.relay_call_attempts.max(1);
        let client = self.relay.as_mut().ok_or(RelayError::SessionInvalid)?;

        let mut attempt = 1;
        loop {
            match bootstrap_once(client, has_cached_pepper, &mut self.captcha_token).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempt < max => {
                    warn!(attempt, error = %e, "session bootstrap failed, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// The session's wallet, deploying one if the relay knows of none.
    async fn ensure_wallet(&mut self) -> Result<Address, VerificationError> {
        let implementation = self.config.wallet_implementation_address.clone();
        let client = self.relay.as_mut().ok_or(RelayError::SessionInvalid)?;
        if let Some(wallet) = client.session().wallet_address.clone() {
            return Ok(wallet);
        }

        let implementation = implementation.ok_or_else(|| {
            VerificationError::Config("no wallet implementation to deploy".into())
        })?;
        match client.deploy_wallet(&implementation).await {
            Ok(wallet) => {
                self.events.push(VerificationEvent::WalletDeployed {
                    wallet: wallet.clone(),
                });
                Ok(wallet)
            }
            Err(deploy_err) => {
                warn!(error = %deploy_err, "wallet deployment failed, reconciling through the session");
                match client.check_session(true).await {
                    Ok(_) => {
                        if let Some(wallet) = client.session().wallet_address.clone() {
                            info!(%wallet, "recovered deployed wallet from session");
                            return Ok(wallet);
                        }
                    }
                    Err(e) => debug!(error = %e, "session check after failed deploy also failed"),
                }
                Err(deploy_err.into())
            }
        }
    }

    // ── Requesting, revealing and completing ─────────────────────────────

    async fn attest(
        &mut self,
        prepared: &Prepared,
        status: AttestationsStatus,
        without_revealing: bool,
    ) -> Result<(), VerificationError> {
        let identifier = prepared.identity.identifier;
        let required = self.config.params.num_attestations_required as usize;
        let max = self.config.params.max_actionable_attestations as usize;
        let completed_before = required.saturating_sub(status.remaining());

        let mut actionable = self
            .directory
            .get_actionable_attestations(&identifier, &prepared.account)
            .await?;
        self.actionable = actionable.clone();
        self.start_listening(prepared, &actionable);

        if !without_revealing {
            let revealed = self.reveal_all(prepared, &actionable).await;
            let to_request = status.remaining().saturating_sub(revealed);
            if to_request + actionable.len() > max {
                return Err(VerificationError::MaxActionableExceeded {
                    requested: to_request,
                    actionable: actionable.len(),
                    max,
                });
            }

            if to_request > 0 {
                self.set_status(VerificationStatus::RequestingAttestations);
                let previous = actionable.clone();
                actionable = self
                    .acquire(prepared, actionable.len() + to_request)
                    .await?;
                self.actionable = actionable.clone();
                self.start_listening(prepared, &actionable);

                let fresh: Vec<ActionableAttestation> = actionable
                    .iter()
                    .filter(|a| !previous.iter().any(|p| p.issuer == a.issuer))
                    .cloned()
                    .collect();
                self.reveal_all(prepared, &fresh).await;
            }
        }

        self.set_status(VerificationStatus::CompletingAttestations);
        self.complete_all(prepared, &actionable, completed_before)
            .await?;

        let status = self
            .directory
            .get_attestations_status(&prepared.account, &identifier)
            .await?;
        if !status.is_verified {
            return Err(VerificationError::Incomplete {
                remaining: status.remaining(),
            });
        }
        Ok(())
    }

    /// Request and select until `target` attestations are actionable.
    async fn acquire(
        &mut self,
        prepared: &Prepared,
        target: usize,
    ) -> Result<Vec<ActionableAttestation>, VerificationError> {
        let identifier = prepared.identity.identifier;
        let account = &prepared.account;
        let max = self.config.params.max_actionable_attestations as usize;
        let mut backend = backend_for(&mut self.relay, &self.deps, prepared);

        let mut actionable = self
            .directory
            .get_actionable_attestations(&identifier, account)
            .await?;
        let mut rounds = 0;
        while actionable.len() < target {
            let needed = target - actionable.len();
            if rounds >= max {
                return Err(VerificationError::MaxActionableExceeded {
                    requested: needed,
                    actionable: actionable.len(),
                    max,
                });
            }
            rounds += 1;

            match self
                .directory
                .reusable_unselected_request(&identifier, account)
                .await?
            {
                Some(request) => {
                    info!(
                        block = request.block_number,
                        count = request.attestations_requested,
                        "reusing unselected attestation request"
                    );
                }
                None => {
                    info!(count = needed, "requesting attestations");
                    backend
                        .request_attestations(&identifier, count_u32(needed), true)
                        .await?;
                }
            }
            self.directory
                .wait_for_selecting_issuers(&identifier, account)
                .await?;
            backend.select_issuers(&identifier).await?;

            actionable = self
                .directory
                .get_actionable_attestations(&identifier, account)
                .await?;
            if actionable.len() > max {
                return Err(VerificationError::MaxActionableExceeded {
                    requested: needed,
                    actionable: actionable.len(),
                    max,
                });
            }
            debug!(actionable = actionable.len(), target, "issuers selected");
        }
        Ok(actionable)
    }

    /// (Re)start code intake for `attestations`, and the platform retriever
    /// if it is not already running.
    ///
    /// A running listener keeps going with the new attestations, so a message
    /// it is already validating is not lost.
    fn start_listening(&mut self, prepared: &Prepared, attestations: &[ActionableAttestation]) {
        let ctx = IntakeContext {
            identifier: prepared.identity.identifier,
            account: prepared.account.clone(),
            phone: self.phone.clone(),
            pepper: prepared.identity.pepper.clone(),
            attestations: attestations.to_vec(),
        };
        let running = self.listener.as_ref().is_some_and(|l| !l.is_finished());
        let current = self.intake_context.as_ref().filter(|_| running);
        if let Some(contexts) = current {
            contexts.send_replace(ctx);
        } else {
            let intake = CodeIntake::new(
                self.deps.chain.clone(),
                self.deps.issuers.clone(),
                self.deps.signer.clone(),
                self.book.clone(),
                self.events.clone(),
                self.config.short_codes_enabled,
            );
            let (contexts, rx) = watch::channel(ctx);
            self.listener = Some(tokio::spawn(listen(intake, rx, self.inbound_rx.clone())));
            self.intake_context = Some(contexts);
        }

        if self.retriever_task.is_none() {
            if let Some(retriever) = self.deps.retriever.clone() {
                let sink = self.code_sink();
                self.retriever_task = Some(tokio::spawn(async move { retriever.run(sink).await }));
            }
        }
    }

    /// Reveal to every issuer in `attestations`; returns how many succeeded.
    async fn reveal_all(&mut self, prepared: &Prepared, attestations: &[ActionableAttestation]) -> usize {
        if attestations.is_empty() {
            return 0;
        }
        let this = &*self;
        let outcomes = join_all(attestations.iter().map(|attestation| {
            this.reveal(prepared, attestation)
                .instrument(reveal_span(attestation.issuer.as_str()))
        }))
        .await;
        self.last_reveal_attempt = Some(self.deps.clock.now());
        let revealed = outcomes.into_iter().filter(|ok| *ok).count();
        info!(revealed, total = attestations.len(), "reveals finished");
        revealed
    }

    /// One reveal, retried once if the issuer has not seen its selection yet.
    /// Failures are reported to the issuer's status endpoint, never raised.
    async fn reveal(&self, prepared: &Prepared, attestation: &ActionableAttestation) -> bool {
        let issuer = &attestation.issuer;
        let request = RevealRequest {
            account: prepared.account.clone(),
            issuer: issuer.clone(),
            phone_number: self.phone.clone(),
            salt: prepared.identity.pepper.as_str().to_string(),
            sms_retriever_app_sig: self.config.sms_retriever_app_signature.clone(),
            language: self.config.language.clone(),
            security_code_prefix: self
                .config
                .short_codes_enabled
                .then(|| security_code_prefix(issuer).to_string()),
        };
        let url = attestation.attestation_service_url.as_str();

        let mut needed_retry = false;
        let mut result = self.deps.issuers.reveal(url, &request).await;
        if matches!(&result, Ok(response) if response.is_not_yet_selected()) {
            needed_retry = true;
            let delay = self.config.params.reveal_retry_delay();
            debug!(?delay, "issuer has not seen its selection yet, retrying once");
            tokio::time::sleep(delay).await;
            result = self.deps.issuers.reveal(url, &request).await;
        }

        let success = match &result {
            Ok(response) if response.ok => true,
            Ok(response) => {
                warn!(
                    status = response.status,
                    error = response.error_message().unwrap_or_default(),
                    "reveal rejected"
                );
                false
            }
            Err(e) => {
                warn!(error = %e, "reveal failed");
                false
            }
        };
        if !success {
            self.report_reveal_status(prepared, attestation).await;
        }
        self.events.push(VerificationEvent::Revealed {
            issuer: issuer.clone(),
            success,
            needed_retry,
        });
        success
    }

    async fn report_reveal_status(&self, prepared: &Prepared, attestation: &ActionableAttestation) {
        let query = RevealStatusQuery {
            account: prepared.account.clone(),
            issuer: attestation.issuer.clone(),
            phone_number: self.phone.clone(),
            salt: prepared.identity.pepper.as_str().to_string(),
        };
        match self
            .deps
            .issuers
            .reveal_status(&attestation.attestation_service_url, &query)
            .await
        {
            Ok(response) => {
                debug!(issuer = %attestation.issuer, status = response.status, "reveal status reported")
            }
            Err(e) => debug!(issuer = %attestation.issuer, error = %e, "reveal status report failed"),
        }
    }

    /// Best-effort status report for every attestation still without a code.
    async fn report_reveal_statuses(&self) {
        let Some(prepared) = &self.prepared else {
            return;
        };
        if self.last_reveal_attempt.is_none() {
            return;
        }
        let pending: Vec<&ActionableAttestation> = self
            .actionable
            .iter()
            .filter(|a| self.book.code_for(&a.issuer).is_none())
            .collect();
        join_all(
            pending
                .into_iter()
                .map(|attestation| self.report_reveal_status(prepared, attestation)),
        )
        .await;
    }

    /// Complete each attestation as its code arrives, until the required
    /// count is reached or every attestation is done.
    async fn complete_all(
        &mut self,
        prepared: &Prepared,
        attestations: &[ActionableAttestation],
        completed_before: usize,
    ) -> Result<(), VerificationError> {
        let identifier = prepared.identity.identifier;
        let required = self.config.params.num_attestations_required as usize;
        let stagger = self.config.params.completion_stagger();
        let revert_retries = self.config.params.completion_revert_retries;
        info!(
            outstanding = attestations.len(),
            completed = completed_before,
            required,
            "waiting for attestation codes"
        );

        let backend = Mutex::new(backend_for(&mut self.relay, &self.deps, prepared));
        let (done_tx, mut done_rx) = watch::channel(completed_before);
        let directory = &self.directory;
        let events = &self.events;
        let book = &self.book;
        let backend = &backend;
        let done_tx = &done_tx;

        let completions = try_join_all(attestations.iter().enumerate().map(|(index, attestation)| {
            let issuer = attestation.issuer.clone();
            async move {
                let code = book.wait_for_code(&issuer).await;
                tokio::time::sleep(stagger * count_u32(index)).await;
                let mut backend = backend.lock().await;
                complete_with_retry(&mut **backend, directory, &identifier, &code, revert_retries)
                    .await?;
                info!("attestation completed");
                events.push(VerificationEvent::AttestationCompleted {
                    issuer: issuer.clone(),
                });
                done_tx.send_modify(|n| *n += 1);
                Ok::<_, VerificationError>(())
            }
            .instrument(completion_span(attestation.issuer.as_str(), index))
        }));

        tokio::select! {
            result = completions => result.map(|_| ()),
            _ = done_rx.wait_for(|n| *n >= required) => {
                debug!("required completions reached");
                Ok(())
            }
        }
    }

    // ── Finalization ─────────────────────────────────────────────────────

    /// Register the account's wallet and data encryption key if they differ
    /// from what is on chain, then record the verified wallet.
    async fn finalize(&mut self, prepared: &Prepared) -> Result<(), VerificationError> {
        let account = &prepared.account;
        let dek = self.deps.signer.data_encryption_key();
        let chain = self.deps.chain.clone();
        let registered_wallet = chain.account_wallet_address(account).await?;
        let registered_dek = chain.account_data_encryption_key(account).await?;

        let up_to_date =
            registered_wallet.as_ref() == Some(account) && registered_dek.as_deref() == Some(dek.as_str());
        if up_to_date {
            debug!(%account, "account registration already up to date");
        } else if !prepared.relayed && *account != self.deps.signer.address() {
            warn!(%account, "relay unavailable, wallet registration deferred");
        } else {
            let mut backend = backend_for(&mut self.relay, &self.deps, prepared);
            backend.set_account(account, &dek).await?;
            info!(%account, "account registered");
        }

        self.verified_wallet = Some(account.clone());
        info!(%account, "phone number verified");
        Ok(())
    }
}

impl Drop for VerificationOrchestrator {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// One pass of session bootstrap: check, start with the captcha if the
/// session is missing or exhausted, then re-check.
async fn bootstrap_once(
    client: &mut RelaySessionClient,
    has_cached_pepper: bool,
    captcha_token: &mut Option<String>,
) -> Result<(), VerificationError> {
    let needs_new = if client.session().token.is_none() {
        true
    } else {
        match client.check_session(has_cached_pepper).await {
            Ok(_) => !client.session().active,
            Err(RelayError::SessionInvalid) => true,
            Err(e) => return Err(e.into()),
        }
    };
    if !needs_new {
        return Ok(());
    }

    let captcha = captcha_token
        .clone()
        .ok_or(VerificationError::CaptchaRequired)?;
    client.start_session(&captcha).await?;
    *captcha_token = None;
    let checked = client.check_session(has_cached_pepper).await?;
    if client.session().active {
        return Ok(());
    }
    if !has_cached_pepper && checked.quota.distributed_blinded_pepper == 0 {
        Err(VerificationError::SaltQuotaExceeded)
    } else {
        Err(VerificationError::SessionExhausted)
    }
}

/// Submit a completion, retrying reverts after the next block.
async fn complete_with_retry(
    backend: &mut (dyn AttestationBackend + '_),
    directory: &AttestationDirectory,
    identifier: &Identifier,
    code: &AttestationCode,
    revert_retries: u32,
) -> Result<(), VerificationError> {
    let mut retries = 0;
    loop {
        match backend.complete(identifier, &code.issuer, &code.code).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_revert() && retries < revert_retries => {
                retries += 1;
                warn!(retry = retries, error = %e, "completion reverted, retrying after the next block");
                directory.wait_for_next_block().await?;
            }
            Err(e) if e.is_revert() => {
                return Err(VerificationError::Completion {
                    issuer: code.issuer.clone(),
                    reason: e.to_string(),
                })
            }
            Err(e) => return Err(e),
        }
    }
}

fn backend_for<'a>(
    relay: &'a mut Option<RelaySessionClient>,
    deps: &Collaborators,
    prepared: &Prepared,
) -> Box<dyn AttestationBackend + 'a> {
    match relay {
        Some(client) if prepared.relayed => {
            Box::new(RelayedBackend::new(client, prepared.account.clone()))
        }
        _ => Box::new(DirectBackend::new(
            deps.chain.clone(),
            deps.sender.clone(),
            prepared.account.clone(),
        )),
    }
}

fn count_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
