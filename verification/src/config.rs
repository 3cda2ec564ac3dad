//! Verification configuration with TOML file support.

use crate::error::VerificationError;
use avk_types::{Address, VerificationParams};
use avk_utils::LogFormat;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a verification host.
///
/// Can be loaded from a TOML file via [`VerificationConfig::from_toml_file`]
/// or built programmatically (e.g. for tests).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Go through the fee-delegating relay instead of sending transactions
    /// from the account directly.
    #[serde(default = "default_true")]
    pub use_relay: bool,

    #[serde(default = "default_relay_url")]
    pub relay_url: String,

    #[serde(default = "default_request_timeout_secs")]
    pub relay_request_timeout_secs: u64,

    /// Pepper service used when not going through the relay.
    #[serde(default = "default_odis_url")]
    pub odis_url: String,

    /// Implementation new meta-transaction wallets are deployed with.
    #[serde(default)]
    pub wallet_implementation_address: Option<Address>,

    /// Implementations an existing wallet may run. The deploy implementation
    /// is always allowed.
    #[serde(default)]
    pub allowed_wallet_implementations: Vec<Address>,

    /// Ask issuers for short security codes instead of full codes.
    #[serde(default)]
    pub short_codes_enabled: bool,

    /// App hash that lets the platform auto-read the SMS.
    #[serde(default)]
    pub sms_retriever_app_signature: Option<String>,

    /// Language of the code message.
    #[serde(default = "default_language")]
    pub language: String,

    /// Reported to the pepper service.
    #[serde(default = "default_client_version")]
    pub client_version: String,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub params: VerificationParams,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_true() -> bool {
    true
}

fn default_relay_url() -> String {
    "https://relay.example.org".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_odis_url() -> String {
    "https://pepper.example.org".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_client_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl VerificationConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, VerificationError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| VerificationError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, VerificationError> {
        toml::from_str(s).map_err(|e| VerificationError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, VerificationError> {
        toml::to_string_pretty(self).map_err(|e| VerificationError::Config(e.to_string()))
    }

    pub fn relay_request_timeout(&self) -> Duration {
        Duration::from_secs(self.relay_request_timeout_secs)
    }

    /// The allow-list wallets are validated against.
    pub fn allowed_implementations(&self) -> Vec<Address> {
        let mut allowed = self.allowed_wallet_implementations.clone();
        if let Some(implementation) = &self.wallet_implementation_address {
            if !allowed.contains(implementation) {
                allowed.push(implementation.clone());
            }
        }
        allowed
    }
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            use_relay: default_true(),
            relay_url: default_relay_url(),
            relay_request_timeout_secs: default_request_timeout_secs(),
            odis_url: default_odis_url(),
            wallet_implementation_address: None,
            allowed_wallet_implementations: Vec::new(),
            short_codes_enabled: false,
            sms_retriever_app_signature: None,
            language: default_language(),
            client_version: default_client_version(),
            log_format: LogFormat::default(),
            log_level: default_log_level(),
            params: VerificationParams::default(),
        }
    }
}
