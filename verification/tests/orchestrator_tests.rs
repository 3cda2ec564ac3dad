//! Verification runs end to end against the in-memory chain, relay and issuers.

use avk_chain::AccountSigner;
use avk_identity::{IdentifierResolver, MemoryPepperCache, PhoneIdentity};
use avk_nullables::{
    NullChain, NullClock, NullCodeRetriever, NullIssuer, NullMetaSigner, NullPepperService,
    NullRelay, NullSigner, RevealOutcome,
};
use avk_relay::SessionQuota;
use avk_types::{
    Address, AttestationStat, CodeInputType, E164Number, VerificationParams, VerificationStatus,
};
use avk_verification::{
    Collaborators, VerificationConfig, VerificationError, VerificationEvent,
    VerificationOrchestrator, VerificationSnapshot,
};
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Harness {
    chain: Arc<NullChain>,
    issuer: Arc<NullIssuer>,
    relay: Arc<NullRelay>,
    pepper: NullPepperService,
    signer: Arc<NullSigner>,
    cache: Arc<MemoryPepperCache>,
    retriever: Arc<NullCodeRetriever>,
}

impl Harness {
    /// Codes reach the orchestrator through the platform retriever.
    fn auto_read(issuers: usize) -> Self {
        let h = Self::manual(issuers);
        let retriever = Arc::new(NullCodeRetriever::from_channel(h.issuer.subscribe()));
        Self { retriever, ..h }
    }

    /// Nothing is read automatically; tests deliver codes themselves.
    fn manual(issuers: usize) -> Self {
        let chain = Arc::new(NullChain::with_issuers(issuers));
        let pepper = NullPepperService::default();
        Self {
            issuer: Arc::new(NullIssuer::new(chain.clone())),
            relay: Arc::new(NullRelay::new(chain.clone(), pepper.clone())),
            pepper,
            signer: Arc::new(NullSigner::default()),
            cache: Arc::new(MemoryPepperCache::new()),
            retriever: Arc::new(NullCodeRetriever::idle()),
            chain,
        }
    }

    fn collaborators(&self) -> Collaborators {
        Collaborators {
            chain: self.chain.clone(),
            sender: self.chain.clone(),
            signer: self.signer.clone(),
            meta_signer: Arc::new(NullMetaSigner),
            issuers: self.issuer.clone(),
            pepper_cache: self.cache.clone(),
            clock: Arc::new(NullClock::default()),
            relay: Some(self.relay.clone()),
            pepper_source: Some(Box::new(self.pepper.clone())),
            retriever: Some(self.retriever.clone()),
        }
    }

    fn orchestrator(&self, config: VerificationConfig) -> VerificationOrchestrator {
        VerificationOrchestrator::new(config, phone(), self.collaborators())
    }

    /// Resolve and cache the phone's identity before the run.
    async fn pre_resolve(&self) -> PhoneIdentity {
        IdentifierResolver::new(self.cache.clone(), "test")
            .resolve(&phone(), &mut self.pepper.clone())
            .await
            .unwrap()
    }

    /// A wallet of this signer running the allowed implementation.
    fn existing_wallet(&self, n: u64) -> Address {
        let wallet = Address::new(format!("0x{:040x}", 0xbeef_0000 + n));
        self.chain
            .register_wallet(&wallet, &implementation(), &self.signer.address());
        wallet
    }
}

fn phone() -> E164Number {
    E164Number::parse("+14155550123").unwrap()
}

fn implementation() -> Address {
    Address::new("0x0000000000000000000000000000000000001111")
}

/// The first wallet the in-memory relay deploys.
fn first_deployed_wallet() -> Address {
    Address::new(format!("0x{:040x}", 0x3a11_e701u64))
}

fn config(relayed: bool) -> VerificationConfig {
    VerificationConfig {
        use_relay: relayed,
        wallet_implementation_address: Some(implementation()),
        params: VerificationParams::fast(),
        ..VerificationConfig::default()
    }
}

fn statuses(events: &[VerificationEvent]) -> Vec<VerificationStatus> {
    events
        .iter()
        .filter_map(|e| match e {
            VerificationEvent::StatusChanged(s) => Some(*s),
            _ => None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// 1. Relayed path
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn relayed_run_deploys_requests_reveals_and_completes() {
    let h = Harness::auto_read(5);
    let mut orch = h.orchestrator(config(true));
    orch.set_captcha_token("captcha");

    orch.run(false).await.unwrap();

    let wallet = first_deployed_wallet();
    assert_eq!(orch.status(), VerificationStatus::Done);
    assert_eq!(orch.verified_wallet(), Some(&wallet));
    assert_eq!(h.relay.calls("startSession"), 1);
    assert_eq!(h.relay.wallets_deployed(), 1);
    assert_eq!(h.relay.calls("requestSubsidisedAttestations"), 1);
    assert_eq!(h.pepper.calls(), 1);
    assert_eq!(h.cache.len(), 1);
    assert_eq!(h.issuer.reveals().len(), 3);
    assert_eq!(orch.accepted_codes().len(), 3);
    assert_eq!(h.chain.account_wallet(&wallet), Some(wallet.clone()));

    let events = orch.drain_events();
    assert_eq!(
        statuses(&events),
        vec![
            VerificationStatus::Prepping,
            VerificationStatus::GettingStatus,
            VerificationStatus::RequestingAttestations,
            VerificationStatus::CompletingAttestations,
            VerificationStatus::Done,
        ]
    );
    assert!(events.contains(&VerificationEvent::WalletDeployed {
        wallet: wallet.clone()
    }));
    let completed = events
        .iter()
        .filter(|e| matches!(e, VerificationEvent::AttestationCompleted { .. }))
        .count();
    assert_eq!(completed, 3);
    assert!(events.iter().any(|e| matches!(
        e,
        VerificationEvent::CodeAccepted {
            input_type: CodeInputType::Automatic,
            ..
        }
    )));
}

#[tokio::test(start_paused = true)]
async fn missing_captcha_stops_before_starting_a_session() {
    let h = Harness::auto_read(5);
    let mut orch = h.orchestrator(config(true));

    let err = orch.run(false).await.unwrap_err();
    assert_eq!(err, VerificationError::CaptchaRequired);
    assert_eq!(orch.status(), VerificationStatus::Failed);
    assert_eq!(h.relay.calls("startSession"), 0);
}

#[tokio::test(start_paused = true)]
async fn exhausted_session_quota_is_reported() {
    let h = Harness::auto_read(5);
    h.relay.set_quota(SessionQuota {
        distributed_blinded_pepper: 1,
        request_subsidised_attestation: 0,
        submit_meta_transaction: 20,
    });
    let mut orch = h.orchestrator(config(true));
    orch.set_captcha_token("captcha");

    let err = orch.run(false).await.unwrap_err();
    assert_eq!(err, VerificationError::SessionExhausted);
    assert_eq!(h.relay.calls("startSession"), 1);
    assert_eq!(h.relay.wallets_deployed(), 0);
}

#[tokio::test(start_paused = true)]
async fn no_pepper_quota_without_cached_pepper_is_salt_quota_exceeded() {
    let h = Harness::auto_read(5);
    h.relay.set_quota(SessionQuota {
        distributed_blinded_pepper: 0,
        request_subsidised_attestation: 10,
        submit_meta_transaction: 20,
    });
    let mut orch = h.orchestrator(config(true));
    orch.set_captcha_token("captcha");

    let err = orch.run(false).await.unwrap_err();
    assert_eq!(err, VerificationError::SaltQuotaExceeded);
    assert_eq!(orch.status(), VerificationStatus::SaltQuotaExceeded);
    assert_eq!(h.relay.calls("distributedBlindedPepper"), 0);
}

#[tokio::test(start_paused = true)]
async fn existing_verified_wallet_short_circuits() {
    let h = Harness::auto_read(5);
    let identity = h.pre_resolve().await;
    let wallet = h.existing_wallet(1);
    h.chain.mark_verified(identity.identifier, &wallet, 3);
    let mut orch = h.orchestrator(config(true));
    orch.set_captcha_token("captcha");

    orch.run(false).await.unwrap();

    assert_eq!(orch.verified_wallet(), Some(&wallet));
    assert_eq!(h.relay.wallets_deployed(), 0);
    assert_eq!(h.relay.calls("requestSubsidisedAttestations"), 0);
    assert!(h.issuer.reveals().is_empty());
    assert_eq!(h.chain.account_wallet(&wallet), Some(wallet.clone()));
    assert!(orch
        .drain_events()
        .contains(&VerificationEvent::VerifiedWalletFound { wallet }));
}

#[tokio::test(start_paused = true)]
async fn several_verified_wallets_are_refused() {
    let h = Harness::auto_read(5);
    let identity = h.pre_resolve().await;
    let a = h.existing_wallet(1);
    let b = h.existing_wallet(2);
    h.chain.mark_verified(identity.identifier, &a, 3);
    h.chain.mark_verified(identity.identifier, &b, 3);
    let mut orch = h.orchestrator(config(true));
    orch.set_captcha_token("captcha");

    let err = orch.run(false).await.unwrap_err();
    match err {
        VerificationError::MultipleVerifiedWallets(wallets) => {
            assert_eq!(wallets.len(), 2);
            assert!(wallets.contains(&a) && wallets.contains(&b));
        }
        other => panic!("expected MultipleVerifiedWallets, got {other:?}"),
    }
    assert_eq!(orch.status(), VerificationStatus::Failed);
    assert!(orch.verified_wallet().is_none());
}

#[tokio::test(start_paused = true)]
async fn relay_down_falls_back_to_a_verified_wallet() {
    let h = Harness::auto_read(5);
    let identity = h.pre_resolve().await;
    let wallet = h.existing_wallet(1);
    h.chain.mark_verified(identity.identifier, &wallet, 3);
    h.relay.set_up(false);
    let mut orch = h.orchestrator(config(true));

    orch.run(false).await.unwrap();

    assert_eq!(orch.verified_wallet(), Some(&wallet));
    assert_eq!(h.relay.calls("ready"), 3);
    assert_eq!(h.relay.calls("startSession"), 0);
    assert_eq!(h.chain.account_wallet(&wallet), None);
}

#[tokio::test(start_paused = true)]
async fn relay_down_falls_back_to_direct_verification() {
    let h = Harness::auto_read(5);
    let signer = h.signer.address();
    h.chain.set_balance(&signer, 10_000);
    h.relay.set_up(false);
    let mut orch = h.orchestrator(config(true));

    orch.run(false).await.unwrap();

    assert_eq!(orch.status(), VerificationStatus::Done);
    assert_eq!(orch.verified_wallet(), Some(&signer));
    assert!(!orch.is_relayed());
    assert_eq!(h.relay.calls("ready"), 3);
    assert_eq!(h.relay.calls("startSession"), 0);
    assert_eq!(h.relay.wallets_deployed(), 0);
    assert_eq!(h.pepper.calls(), 1);
    assert_eq!(h.chain.count_sent("request"), 1);
    assert_eq!(h.chain.count_sent("complete"), 3);
    assert_eq!(h.chain.account_wallet(&signer), Some(signer.clone()));
    assert!(orch
        .drain_events()
        .iter()
        .any(|e| matches!(e, VerificationEvent::RelayBypassed { .. })));

    // Three failed probes exceed the allotment of two, so the next run
    // skips probing and goes straight to the direct path.
    orch.run(false).await.unwrap();
    assert_eq!(orch.status(), VerificationStatus::Done);
    assert_eq!(h.relay.calls("ready"), 3);
    assert_eq!(h.chain.count_sent("request"), 1);
}

#[tokio::test(start_paused = true)]
async fn invalid_session_wallet_falls_back_to_direct_verification() {
    let h = Harness::auto_read(5);
    let signer = h.signer.address();
    h.chain.set_balance(&signer, 10_000);
    let wallet = Address::new(format!("0x{:040x}", 0xbad0_0001u64));
    let unknown_implementation = Address::new("0x0000000000000000000000000000000000002222");
    h.chain
        .register_wallet(&wallet, &unknown_implementation, &signer);
    h.relay.set_wallet(Some(wallet.clone()));
    let mut orch = h.orchestrator(config(true));
    orch.set_captcha_token("captcha");

    orch.run(false).await.unwrap();

    assert_eq!(orch.verified_wallet(), Some(&signer));
    assert_eq!(h.relay.calls("startSession"), 1);
    assert_eq!(h.relay.wallets_deployed(), 0);
    assert_eq!(h.relay.calls("requestSubsidisedAttestations"), 0);
    assert_eq!(h.chain.count_sent("request"), 1);
    assert_eq!(h.chain.account_wallet(&wallet), None);
    assert!(orch
        .drain_events()
        .iter()
        .any(|e| matches!(e, VerificationEvent::RelayBypassed { .. })));
}

#[tokio::test(start_paused = true)]
async fn restart_reuses_wallet_and_request() {
    let h = Harness::manual(5);
    let mut orch = h.orchestrator(config(true));
    orch.set_captcha_token("captcha");
    let control = orch.control();
    let sink = orch.code_sink();
    let mut status = orch.subscribe_status();

    let chain = h.chain.clone();
    let issuer = h.issuer.clone();
    let cache = h.cache.clone();
    let driver = tokio::spawn(async move {
        status
            .wait_for(|s| *s == VerificationStatus::CompletingAttestations)
            .await
            .unwrap();
        control.restart();
        while issuer.reveals().len() < 6 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let identity = IdentifierResolver::new(cache, "test")
            .resolve_cached(&phone())
            .unwrap();
        let wallet = first_deployed_wallet();
        for attested_by in chain.issuers().iter().take(3) {
            let message = chain.code_message(identity.identifier, &wallet, attested_by);
            sink.deliver(message, CodeInputType::Manual);
        }
    });

    orch.run(false).await.unwrap();
    driver.await.unwrap();

    assert_eq!(orch.status(), VerificationStatus::Done);
    assert_eq!(h.relay.wallets_deployed(), 1);
    assert_eq!(h.relay.calls("startSession"), 1);
    assert_eq!(h.relay.calls("requestSubsidisedAttestations"), 1);
    assert_eq!(h.chain.count_sent("request"), 1);
    assert_eq!(h.chain.count_sent("complete"), 3);
}

#[tokio::test(start_paused = true)]
async fn snapshot_restores_session_and_verified_wallet() {
    let h = Harness::auto_read(5);
    let mut orch = h.orchestrator(config(true));
    orch.set_captcha_token("captcha");
    orch.run(false).await.unwrap();

    let json = orch.snapshot().to_json().unwrap();
    drop(orch);
    let snapshot = VerificationSnapshot::from_json(&json).unwrap();
    assert_eq!(snapshot.status, VerificationStatus::Done);
    assert!(snapshot.session.token.is_some());

    let mut restored =
        VerificationOrchestrator::restore(config(true), phone(), h.collaborators(), snapshot);
    assert_eq!(restored.status(), VerificationStatus::Done);
    assert_eq!(restored.verified_wallet(), Some(&first_deployed_wallet()));

    restored.run(false).await.unwrap();
    assert_eq!(h.relay.calls("startSession"), 1);
    assert_eq!(h.relay.wallets_deployed(), 1);
    assert_eq!(h.relay.calls("requestSubsidisedAttestations"), 1);
}

// ---------------------------------------------------------------------------
// 2. Direct path
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn direct_run_pays_selects_and_completes() {
    let h = Harness::auto_read(5);
    h.chain.set_balance(&h.signer.address(), 10_000);
    let mut orch = h.orchestrator(config(false));

    orch.run(false).await.unwrap();

    assert_eq!(orch.verified_wallet(), Some(&h.signer.address()));
    assert_eq!(h.chain.count_sent("approve"), 1);
    assert_eq!(h.chain.count_sent("request"), 1);
    assert_eq!(h.chain.count_sent("selectIssuers"), 1);
    assert_eq!(h.chain.count_sent("complete"), 3);
    assert_eq!(h.chain.count_sent("setAccount"), 1);
    assert_eq!(h.relay.calls("ready"), 0);
}

#[tokio::test(start_paused = true)]
async fn direct_run_with_assigned_issuers_only_reveals() {
    let h = Harness::auto_read(5);
    let identity = h.pre_resolve().await;
    let account = h.signer.address();
    h.chain.add_actionable(identity.identifier, &account, 3);
    let slow = h.chain.issuers()[1].clone();
    h.issuer.script(&slow, [RevealOutcome::NotYetSelected]);
    let mut orch = h.orchestrator(config(false));

    orch.run(false).await.unwrap();

    assert_eq!(h.pepper.calls(), 1);
    assert_eq!(h.chain.count_sent("request"), 0);
    assert_eq!(h.issuer.reveal_count(&slow), 2);
    assert_eq!(h.chain.count_sent("complete"), 3);
    assert!(orch.drain_events().contains(&VerificationEvent::Revealed {
        issuer: slow,
        success: true,
        needed_retry: true,
    }));
}

#[tokio::test(start_paused = true)]
async fn low_fee_balance_is_insufficient_balance() {
    let h = Harness::auto_read(5);
    let mut orch = h.orchestrator(config(false));

    let err = orch.run(false).await.unwrap_err();
    assert_eq!(err, VerificationError::InsufficientBalance);
    assert_eq!(orch.status(), VerificationStatus::InsufficientBalance);
    assert_eq!(h.chain.count_sent("request"), 0);
}

#[tokio::test(start_paused = true)]
async fn reverted_completions_are_retried() {
    let h = Harness::auto_read(5);
    let identity = h.pre_resolve().await;
    h.chain
        .add_actionable(identity.identifier, &h.signer.address(), 3);
    h.chain.revert_next("complete", 2);
    let mut orch = h.orchestrator(config(false));

    orch.run(false).await.unwrap();

    assert_eq!(orch.status(), VerificationStatus::Done);
    assert_eq!(h.chain.count_sent("complete"), 3);
    let reverted = h
        .chain
        .sent_calls()
        .iter()
        .filter(|c| c.reverted)
        .count();
    assert_eq!(reverted, 2);
}

#[tokio::test(start_paused = true)]
async fn completion_gives_up_after_revert_retries() {
    let h = Harness::auto_read(5);
    let identity = h.pre_resolve().await;
    h.chain
        .add_actionable(identity.identifier, &h.signer.address(), 3);
    h.chain.revert_next("complete", 10);
    let mut orch = h.orchestrator(config(false));

    let err = orch.run(false).await.unwrap_err();
    assert!(matches!(err, VerificationError::Completion { .. }), "{err:?}");
    assert_eq!(orch.status(), VerificationStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn too_many_actionable_attestations_fail_and_report_reveals() {
    let h = Harness::auto_read(5);
    let identity = h.pre_resolve().await;
    h.chain
        .add_actionable(identity.identifier, &h.signer.address(), 4);
    for issuer in h.chain.issuers().iter().take(4) {
        h.issuer.script(issuer, [RevealOutcome::Rejected(500)]);
    }
    let mut orch = h.orchestrator(config(false));

    let err = orch.run(false).await.unwrap_err();
    assert_eq!(
        err,
        VerificationError::MaxActionableExceeded {
            requested: 3,
            actionable: 4,
            max: 5,
        }
    );
    // One report per failed reveal, then one per pending issuer on failure.
    assert_eq!(h.issuer.status_reports().len(), 8);
    assert_eq!(h.chain.count_sent("request"), 0);
}

#[tokio::test(start_paused = true)]
async fn completed_counters_below_threshold_end_incomplete() {
    let h = Harness::auto_read(5);
    let identity = h.pre_resolve().await;
    let account = h.signer.address();
    // Enough completions, but only 3 of 20 requests answered.
    h.chain.set_stat(
        identity.identifier,
        &account,
        AttestationStat {
            completed: 3,
            total: 20,
        },
    );
    h.chain.associate(identity.identifier, &account);
    h.chain.add_actionable(identity.identifier, &account, 1);
    let mut orch = h.orchestrator(config(false));

    let err = orch.run(false).await.unwrap_err();

    // The one outstanding attestation is completed; 4 of 21 is still short.
    assert_eq!(err, VerificationError::Incomplete { remaining: 1 });
    assert_eq!(orch.status(), VerificationStatus::Failed);
    assert_eq!(h.issuer.reveals().len(), 1);
    assert_eq!(h.chain.count_sent("request"), 0);
    assert_eq!(h.chain.count_sent("complete"), 1);
    assert!(orch.verified_wallet().is_none());
}

#[tokio::test(start_paused = true)]
async fn short_codes_are_expanded_through_the_issuer() {
    let h = Harness::auto_read(5);
    let identity = h.pre_resolve().await;
    h.chain
        .add_actionable(identity.identifier, &h.signer.address(), 3);
    let mut config = config(false);
    config.short_codes_enabled = true;
    let mut orch = h.orchestrator(config);

    orch.run(false).await.unwrap();

    assert_eq!(h.issuer.security_code_lookups(), 3);
    let codes = orch.accepted_codes();
    assert_eq!(codes.len(), 3);
    assert!(codes.iter().all(|c| c.short_code.is_some()));
}

#[tokio::test(start_paused = true)]
async fn without_revealing_waits_for_codes_already_sent() {
    let h = Harness::manual(5);
    let identity = h.pre_resolve().await;
    let account = h.signer.address();
    h.chain.add_actionable(identity.identifier, &account, 3);
    let mut orch = h.orchestrator(config(false));
    for issuer in h.chain.issuers().iter().take(3) {
        let link = h.chain.code_deep_link(identity.identifier, &account, issuer);
        assert!(orch.receive(link, CodeInputType::DeepLink));
    }

    orch.run(true).await.unwrap();

    assert!(h.issuer.reveals().is_empty());
    assert_eq!(h.chain.count_sent("complete"), 3);
}

// ---------------------------------------------------------------------------
// 3. Run control
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn cancel_stops_the_run_and_a_new_run_starts_over() {
    let h = Harness::auto_read(3);
    let identity = h.pre_resolve().await;
    h.chain
        .add_actionable(identity.identifier, &h.signer.address(), 1);
    let slow = h.chain.issuers()[0].clone();
    h.issuer.script(&slow, [RevealOutcome::NotYetSelected]);
    let mut config = config(false);
    config.params.num_attestations_required = 1;
    let mut orch = h.orchestrator(config);

    let control = orch.control();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        control.cancel();
    });
    let err = orch.run(false).await.unwrap_err();
    assert_eq!(err, VerificationError::Cancelled);
    assert_eq!(orch.status(), VerificationStatus::Stopped);
    assert_eq!(h.issuer.reveal_count(&slow), 1);
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(!h.retriever.is_running());
    orch.drain_events();

    orch.run(false).await.unwrap();
    assert_eq!(orch.status(), VerificationStatus::Done);
    assert_eq!(h.retriever.runs(), 2);
    assert_eq!(
        statuses(&orch.drain_events()).first(),
        Some(&VerificationStatus::Prepping)
    );
}

#[tokio::test(start_paused = true)]
async fn missing_codes_time_out_and_report_reveal_status() {
    let h = Harness::manual(5);
    let mut orch = h.orchestrator(config(true));
    orch.set_captcha_token("captcha");

    let err = orch.run(false).await.unwrap_err();
    assert_eq!(err, VerificationError::Timeout("30s".into()));
    assert_eq!(orch.status(), VerificationStatus::Failed);
    assert_eq!(h.issuer.status_reports().len(), 3);
    assert!(orch
        .drain_events()
        .iter()
        .any(|e| matches!(e, VerificationEvent::Failed { .. })));
}
