//! Nullable pepper service: a real OPRF evaluation under a fixed key.

use async_trait::async_trait;
use avk_crypto::{evaluate, BlindedMessage, OprfKey};
use avk_identity::{IdentityError, PepperSource};
use avk_relay::FetchError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// Evaluates blinded phone numbers under a deterministic key.
///
/// Clones share their key, call counter and scripted failure.
#[derive(Clone)]
pub struct NullPepperService {
    key: Arc<OprfKey>,
    calls: Arc<AtomicU32>,
    failure: Arc<Mutex<Option<FetchError>>>,
}

impl NullPepperService {
    pub fn new(seed: &[u8]) -> Self {
        Self {
            key: Arc::new(OprfKey::from_seed(seed)),
            calls: Arc::new(AtomicU32::new(0)),
            failure: Arc::new(Mutex::new(None)),
        }
    }

    /// Fail every evaluation with `error` until cleared.
    pub fn fail_with(&self, error: Option<FetchError>) {
        *self.failure.lock().unwrap_or_else(|e| e.into_inner()) = error;
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Evaluate a base64 blinded message, returning the base64 evaluation.
    pub fn evaluate_b64(&self, blinded_b64: &str) -> Result<String, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self
            .failure
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
        {
            return Err(e);
        }
        let blinded =
            BlindedMessage::from_base64(blinded_b64).map_err(|e| FetchError::Decode(e.to_string()))?;
        let evaluation =
            evaluate(&self.key, &blinded).map_err(|e| FetchError::Decode(e.to_string()))?;
        Ok(STANDARD.encode(evaluation))
    }
}

impl Default for NullPepperService {
    fn default() -> Self {
        Self::new(b"null-pepper-service")
    }
}

#[async_trait]
impl PepperSource for NullPepperService {
    async fn blinded_evaluation(
        &mut self,
        blinded: &BlindedMessage,
        _client_version: &str,
    ) -> Result<String, IdentityError> {
        Ok(self.evaluate_b64(&blinded.to_base64())?)
    }
}
