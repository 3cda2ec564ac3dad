//! Identifier resolution end to end: blinding, pepper services, caching.

use avk_identity::{
    FilePepperCache, IdentifierResolver, IdentityError, MemoryPepperCache, PepperCache,
    RelayPepperSource,
};
use avk_nullables::{NullChain, NullClock, NullMetaSigner, NullPepperService, NullRelay, NullSigner};
use avk_relay::{FetchError, RelayCollaborators, RelaySessionClient, Session};
use avk_types::{E164Number, VerificationParams};
use std::sync::Arc;

fn phone() -> E164Number {
    E164Number::parse("+14155550123").unwrap()
}

fn resolver(cache: Arc<dyn PepperCache>) -> IdentifierResolver {
    IdentifierResolver::new(cache, "1.0.0")
}

// ---------------------------------------------------------------------------
// 1. Fetch and cache
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cache_miss_fetches_once_then_serves_from_cache() {
    let cache = Arc::new(MemoryPepperCache::new());
    let resolver = resolver(cache.clone());
    let mut service = NullPepperService::default();

    assert!(!resolver.has_cached_pepper(&phone()));
    let first = resolver.resolve(&phone(), &mut service).await.unwrap();
    assert_eq!(service.calls(), 1);
    assert!(resolver.has_cached_pepper(&phone()));
    assert_eq!(cache.len(), 1);

    let second = resolver.resolve(&phone(), &mut service).await.unwrap();
    assert_eq!(service.calls(), 1);
    assert_eq!(first, second);
}

#[tokio::test]
async fn blinding_does_not_change_the_pepper() {
    let mut service = NullPepperService::default();
    let a = resolver(Arc::new(MemoryPepperCache::new()))
        .resolve(&phone(), &mut service)
        .await
        .unwrap();
    let b = resolver(Arc::new(MemoryPepperCache::new()))
        .resolve(&phone(), &mut service)
        .await
        .unwrap();
    assert_eq!(service.calls(), 2);
    assert_eq!(a.pepper, b.pepper);
    assert_eq!(a.identifier, b.identifier);
}

#[tokio::test]
async fn different_service_keys_give_different_identifiers() {
    let a = resolver(Arc::new(MemoryPepperCache::new()))
        .resolve(&phone(), &mut NullPepperService::new(b"key-a"))
        .await
        .unwrap();
    let b = resolver(Arc::new(MemoryPepperCache::new()))
        .resolve(&phone(), &mut NullPepperService::new(b"key-b"))
        .await
        .unwrap();
    assert_ne!(a.identifier, b.identifier);
}

#[tokio::test]
async fn cached_only_resolution_never_fetches() {
    let resolver = resolver(Arc::new(MemoryPepperCache::new()));
    assert_eq!(
        resolver.resolve_cached(&phone()).unwrap_err(),
        IdentityError::PepperNotCached
    );
}

// ---------------------------------------------------------------------------
// 2. Service failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn quota_rejection_maps_to_salt_quota_exceeded() {
    let cache = Arc::new(MemoryPepperCache::new());
    let mut service = NullPepperService::default();
    service.fail_with(Some(FetchError::QuotaExceeded));

    let err = resolver(cache.clone())
        .resolve(&phone(), &mut service)
        .await
        .unwrap_err();
    assert_eq!(err, IdentityError::SaltQuotaExceeded);
    assert!(cache.is_empty());
}

#[tokio::test]
async fn unpaid_account_maps_to_insufficient_balance() {
    let mut service = NullPepperService::default();
    service.fail_with(Some(FetchError::InsufficientBalance));

    let err = resolver(Arc::new(MemoryPepperCache::new()))
        .resolve(&phone(), &mut service)
        .await
        .unwrap_err();
    assert_eq!(err, IdentityError::InsufficientBalance);
}

// ---------------------------------------------------------------------------
// 3. Relay-backed source
// ---------------------------------------------------------------------------

fn relay_client(service: NullPepperService) -> RelaySessionClient {
    let chain = Arc::new(NullChain::new());
    let deps = RelayCollaborators {
        api: Arc::new(NullRelay::new(chain.clone(), service)),
        chain,
        signer: Arc::new(NullSigner::default()),
        meta_signer: Arc::new(NullMetaSigner),
        clock: Arc::new(NullClock::default()),
    };
    RelaySessionClient::new(deps, Session::default(), &VerificationParams::fast())
}

#[tokio::test]
async fn relay_source_matches_direct_service() {
    let service = NullPepperService::default();
    let mut client = relay_client(service.clone());
    client.start_session("captcha").await.unwrap();

    let relayed = resolver(Arc::new(MemoryPepperCache::new()))
        .resolve(&phone(), &mut RelayPepperSource::new(&mut client))
        .await
        .unwrap();
    let direct = resolver(Arc::new(MemoryPepperCache::new()))
        .resolve(&phone(), &mut service.clone())
        .await
        .unwrap();
    assert_eq!(relayed.identifier, direct.identifier);
}

#[tokio::test]
async fn relay_source_surfaces_exhausted_pepper_quota() {
    let mut client = relay_client(NullPepperService::default());
    client.start_session("captcha").await.unwrap();

    let resolver = resolver(Arc::new(MemoryPepperCache::new()));
    resolver
        .resolve(&phone(), &mut RelayPepperSource::new(&mut client))
        .await
        .unwrap();

    let other = E164Number::parse("+14155550999").unwrap();
    let err = resolver
        .resolve(&other, &mut RelayPepperSource::new(&mut client))
        .await
        .unwrap_err();
    assert_eq!(err, IdentityError::SaltQuotaExceeded);
}

// ---------------------------------------------------------------------------
// 4. Persistent cache
// ---------------------------------------------------------------------------

#[tokio::test]
async fn file_cache_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("peppers.json");
    let mut service = NullPepperService::default();

    let first = {
        let cache = Arc::new(FilePepperCache::open(&path).unwrap());
        resolver(cache).resolve(&phone(), &mut service).await.unwrap()
    };

    let reopened = Arc::new(FilePepperCache::open(&path).unwrap());
    let second = resolver(reopened).resolve_cached(&phone()).unwrap();
    assert_eq!(first, second);
    assert_eq!(service.calls(), 1);
}
