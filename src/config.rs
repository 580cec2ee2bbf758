// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names, default values and the
//! [`TrustConfig`] loaded from the environment once at startup. Secrets are
//! read here and nowhere else; rotating them requires a restart.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `DATA_DIR` | Directory for the session database and audit logs | `/data` |
//! | `STORAGE_BACKEND` | `redb` (on disk) or `memory` | `redb` |
//! | `TOKEN_SECRET` | Secret for first-party and provider tokens | Required |
//! | `WALLET_SESSION_SECRET` | Secret for the wallet session cookie | Required |
//! | `FIELD_ENCRYPTION_KEY` | Secret for sensitive field envelopes | Optional |
//! | `REQUIRE_FIELD_ENCRYPTION` | Refuse to store plaintext sensitive fields | `false` |
//! | `SESSION_TTL_SECS` | First-party session lifetime | `43200` |
//! | `PROVIDER_SESSION_TTL_SECS` | Provider session / wallet cookie lifetime | `3600` |
//! | `CHALLENGE_TTL_SECS` | Wallet and provider challenge lifetime | `300` |
//! | `ENFORCE_SESSION_BINDING` | Cross-check tokens against the session store | `true` |
//! | `SIWE_DOMAIN` | Domain embedded in wallet challenges | `localhost` |
//! | `SIWE_URI` | URI embedded in wallet challenges | `https://localhost` |
//! | `ORACLE_PRIVATE_KEY` | Reward oracle key (hex) | Optional |
//! | `ORACLE_PRIVATE_KEY_PEM` | Reward oracle key (path to PEM) | Optional |
//! | `REWARD_CONTRACT_ADDRESS` | Contract redeeming reward claims | Optional |
//! | `REWARD_CHAIN_ID` | Chain of the reward contract | `1` |
//! | `REWARD_TABLE` | JSON map of activity type to reward | Built-in table |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//!
//! TTLs must lie in `1..=2592000` (30 days).

use std::path::PathBuf;

use chrono::Duration;
use url::Url;
use zeroize::Zeroizing;

use crate::rewards::RewardTable;
use crate::storage::StoragePaths;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";

/// Environment variable name for the data directory path.
///
/// Holds the `trust.redb` session database and the daily audit logs.
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const STORAGE_BACKEND_ENV: &str = "STORAGE_BACKEND";
pub const TOKEN_SECRET_ENV: &str = "TOKEN_SECRET";
pub const WALLET_SESSION_SECRET_ENV: &str = "WALLET_SESSION_SECRET";
pub const FIELD_ENCRYPTION_KEY_ENV: &str = "FIELD_ENCRYPTION_KEY";
pub const REQUIRE_FIELD_ENCRYPTION_ENV: &str = "REQUIRE_FIELD_ENCRYPTION";
pub const SESSION_TTL_ENV: &str = "SESSION_TTL_SECS";
pub const PROVIDER_SESSION_TTL_ENV: &str = "PROVIDER_SESSION_TTL_SECS";
pub const CHALLENGE_TTL_ENV: &str = "CHALLENGE_TTL_SECS";
pub const ENFORCE_SESSION_BINDING_ENV: &str = "ENFORCE_SESSION_BINDING";
pub const SIWE_DOMAIN_ENV: &str = "SIWE_DOMAIN";
pub const SIWE_URI_ENV: &str = "SIWE_URI";
pub const ORACLE_PRIVATE_KEY_ENV: &str = "ORACLE_PRIVATE_KEY";
pub const ORACLE_PRIVATE_KEY_PEM_ENV: &str = "ORACLE_PRIVATE_KEY_PEM";
pub const REWARD_CONTRACT_ADDRESS_ENV: &str = "REWARD_CONTRACT_ADDRESS";
pub const REWARD_CHAIN_ID_ENV: &str = "REWARD_CHAIN_ID";
pub const REWARD_TABLE_ENV: &str = "REWARD_TABLE";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Default data directory.
pub const DEFAULT_DATA_DIR: &str = "/data";
pub const DEFAULT_SESSION_TTL_SECS: i64 = 12 * 60 * 60;
pub const DEFAULT_PROVIDER_SESSION_TTL_SECS: i64 = 60 * 60;
pub const DEFAULT_CHALLENGE_TTL_SECS: i64 = 5 * 60;
/// Upper bound for every `*_TTL_SECS` value (30 days).
pub const MAX_TTL_SECS: i64 = 30 * 24 * 60 * 60;

/// Minimum accepted length for signing secrets.
const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Which redb backend holds sessions, challenges and linked identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// `DATA_DIR/trust.redb` on disk.
    Redb,
    /// Process-local, lost on restart. Tests and local development only.
    Memory,
}

/// Where the reward oracle key comes from.
#[derive(Clone)]
pub enum OracleKeySource {
    Hex(Zeroizing<String>),
    PemFile(PathBuf),
}

impl std::fmt::Debug for OracleKeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OracleKeySource::Hex(_) => write!(f, "Hex([REDACTED])"),
            OracleKeySource::PemFile(path) => write!(f, "PemFile({})", path.display()),
        }
    }
}

/// Reward oracle settings. Only present when a key is configured.
#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub key: OracleKeySource,
    pub contract_address: String,
    pub chain_id: u64,
    pub rewards: RewardTable,
}

/// Process-wide configuration.
#[derive(Clone)]
pub struct TrustConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub storage_backend: StorageBackend,
    pub token_secret: Zeroizing<Vec<u8>>,
    pub wallet_session_secret: Zeroizing<Vec<u8>>,
    pub field_encryption_key: Option<Zeroizing<String>>,
    pub require_field_encryption: bool,
    pub session_ttl: Duration,
    pub provider_session_ttl: Duration,
    pub challenge_ttl: Duration,
    pub enforce_session_binding: bool,
    pub siwe_domain: String,
    pub siwe_uri: Url,
    pub oracle: Option<OracleConfig>,
    pub log_json: bool,
}

impl std::fmt::Debug for TrustConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("data_dir", &self.data_dir)
            .field("storage_backend", &self.storage_backend)
            .field("require_field_encryption", &self.require_field_encryption)
            .field("field_encryption_key", &self.field_encryption_key.is_some())
            .field("session_ttl", &self.session_ttl)
            .field("provider_session_ttl", &self.provider_session_ttl)
            .field("challenge_ttl", &self.challenge_ttl)
            .field("enforce_session_binding", &self.enforce_session_binding)
            .field("siwe_domain", &self.siwe_domain)
            .field("siwe_uri", &self.siwe_uri.as_str())
            .field("oracle", &self.oracle)
            .finish_non_exhaustive()
    }
}

impl TrustConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let token_secret = required_secret(&var, TOKEN_SECRET_ENV)?;
        let wallet_session_secret = required_secret(&var, WALLET_SESSION_SECRET_ENV)?;
        if token_secret.as_slice() == wallet_session_secret.as_slice() {
            return Err(ConfigError::Invalid {
                var: WALLET_SESSION_SECRET_ENV,
                reason: format!("must differ from {TOKEN_SECRET_ENV}"),
            });
        }

        let storage_backend = match var(STORAGE_BACKEND_ENV).as_deref() {
            None | Some("redb") => StorageBackend::Redb,
            Some("memory") => StorageBackend::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: STORAGE_BACKEND_ENV,
                    reason: format!("unknown backend '{other}'"),
                })
            }
        };

        let require_field_encryption = parse_bool(&var, REQUIRE_FIELD_ENCRYPTION_ENV, false)?;
        let field_encryption_key = var(FIELD_ENCRYPTION_KEY_ENV).map(Zeroizing::new);
        if require_field_encryption && field_encryption_key.is_none() {
            return Err(ConfigError::Missing(FIELD_ENCRYPTION_KEY_ENV));
        }

        let enforce_session_binding = parse_bool(&var, ENFORCE_SESSION_BINDING_ENV, true)?;
        if !enforce_session_binding && !cfg!(any(test, feature = "dev")) {
            return Err(ConfigError::Invalid {
                var: ENFORCE_SESSION_BINDING_ENV,
                reason: "session binding can only be disabled in dev builds".to_string(),
            });
        }

        let siwe_uri_raw = var(SIWE_URI_ENV).unwrap_or_else(|| "https://localhost".to_string());
        let siwe_uri = Url::parse(&siwe_uri_raw).map_err(|e| ConfigError::Invalid {
            var: SIWE_URI_ENV,
            reason: e.to_string(),
        })?;

        Ok(Self {
            host: var(HOST_ENV).unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_num(&var, PORT_ENV, 8080)?,
            data_dir: PathBuf::from(
                var(DATA_DIR_ENV).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()),
            ),
            storage_backend,
            token_secret,
            wallet_session_secret,
            field_encryption_key,
            require_field_encryption,
            session_ttl: parse_ttl(&var, SESSION_TTL_ENV, DEFAULT_SESSION_TTL_SECS)?,
            provider_session_ttl: parse_ttl(
                &var,
                PROVIDER_SESSION_TTL_ENV,
                DEFAULT_PROVIDER_SESSION_TTL_SECS,
            )?,
            challenge_ttl: parse_ttl(&var, CHALLENGE_TTL_ENV, DEFAULT_CHALLENGE_TTL_SECS)?,
            enforce_session_binding,
            siwe_domain: var(SIWE_DOMAIN_ENV).unwrap_or_else(|| "localhost".to_string()),
            siwe_uri,
            oracle: load_oracle(&var)?,
            log_json: var(LOG_FORMAT_ENV).as_deref() == Some("json"),
        })
    }

    /// Layout of the data directory.
    pub fn storage_paths(&self) -> StoragePaths {
        StoragePaths::new(&self.data_dir)
    }
}

fn required_secret(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Zeroizing<Vec<u8>>, ConfigError> {
    let value = Zeroizing::new(var(name).ok_or(ConfigError::Missing(name))?);
    if value.len() < MIN_SECRET_LEN {
        return Err(ConfigError::Invalid {
            var: name,
            reason: format!("must be at least {MIN_SECRET_LEN} characters"),
        });
    }
    Ok(Zeroizing::new(value.as_bytes().to_vec()))
}

fn parse_bool(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    match var(name).map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(ConfigError::Invalid {
            var: name,
            reason: format!("expected a boolean, got '{other}'"),
        }),
    }
}

fn parse_num<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match var(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var: name,
            reason: e.to_string(),
        }),
    }
}

fn parse_ttl(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default_secs: i64,
) -> Result<Duration, ConfigError> {
    let secs: i64 = parse_num(var, name, default_secs)?;
    if !(1..=MAX_TTL_SECS).contains(&secs) {
        return Err(ConfigError::Invalid {
            var: name,
            reason: format!("must be between 1 and {MAX_TTL_SECS} seconds"),
        });
    }
    Ok(Duration::seconds(secs))
}

fn load_oracle(
    var: &impl Fn(&str) -> Option<String>,
) -> Result<Option<OracleConfig>, ConfigError> {
    let key = match (var(ORACLE_PRIVATE_KEY_ENV), var(ORACLE_PRIVATE_KEY_PEM_ENV)) {
        (Some(hex), _) => OracleKeySource::Hex(Zeroizing::new(hex)),
        (None, Some(path)) => OracleKeySource::PemFile(PathBuf::from(path)),
        (None, None) => return Ok(None),
    };

    let contract_address = var(REWARD_CONTRACT_ADDRESS_ENV)
        .ok_or(ConfigError::Missing(REWARD_CONTRACT_ADDRESS_ENV))?;

    let rewards = match var(REWARD_TABLE_ENV) {
        Some(raw) => serde_json::from_str(&raw).map_err(|e| ConfigError::Invalid {
            var: REWARD_TABLE_ENV,
            reason: e.to_string(),
        })?,
        None => RewardTable::default(),
    };

    Ok(Some(OracleConfig {
        key,
        contract_address,
        chain_id: parse_num(var, REWARD_CHAIN_ID_ENV, 1)?,
        rewards,
    }))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;

    pub(crate) const TEST_TOKEN_SECRET: &str = "test-token-secret-0123456789abcdef0123";
    pub(crate) const TEST_WALLET_SECRET: &str = "test-wallet-secret-0123456789abcdef012";

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    /// Configuration used by tests across the crate.
    pub(crate) fn test_config() -> TrustConfig {
        TrustConfig::from_lookup(lookup(&[
            (TOKEN_SECRET_ENV, TEST_TOKEN_SECRET),
            (WALLET_SESSION_SECRET_ENV, TEST_WALLET_SECRET),
            (STORAGE_BACKEND_ENV, "memory"),
            (FIELD_ENCRYPTION_KEY_ENV, "field-key-for-tests"),
            (SIWE_DOMAIN_ENV, "social.example"),
            (SIWE_URI_ENV, "https://social.example"),
        ]))
        .unwrap()
    }

    #[test]
    fn defaults_apply() {
        let config = test_config();
        assert_eq!(config.port, 8080);
        assert_eq!(config.session_ttl, Duration::seconds(DEFAULT_SESSION_TTL_SECS));
        assert_eq!(config.challenge_ttl, Duration::seconds(300));
        assert!(config.enforce_session_binding);
        assert_eq!(config.storage_backend, StorageBackend::Memory);
        assert!(config.oracle.is_none());
    }

    #[test]
    fn missing_token_secret_is_rejected() {
        let result =
            TrustConfig::from_lookup(lookup(&[(WALLET_SESSION_SECRET_ENV, TEST_WALLET_SECRET)]));
        assert!(matches!(result, Err(ConfigError::Missing(TOKEN_SECRET_ENV))));
    }

    #[test]
    fn shared_secrets_are_rejected() {
        let result = TrustConfig::from_lookup(lookup(&[
            (TOKEN_SECRET_ENV, TEST_TOKEN_SECRET),
            (WALLET_SESSION_SECRET_ENV, TEST_TOKEN_SECRET),
        ]));
        assert!(matches!(
            result,
            Err(ConfigError::Invalid { var: WALLET_SESSION_SECRET_ENV, .. })
        ));
    }

    #[test]
    fn short_secret_is_rejected() {
        let result = TrustConfig::from_lookup(lookup(&[
            (TOKEN_SECRET_ENV, "short"),
            (WALLET_SESSION_SECRET_ENV, TEST_WALLET_SECRET),
        ]));
        assert!(matches!(result, Err(ConfigError::Invalid { var: TOKEN_SECRET_ENV, .. })));
    }

    #[test]
    fn required_encryption_needs_a_key() {
        let result = TrustConfig::from_lookup(lookup(&[
            (TOKEN_SECRET_ENV, TEST_TOKEN_SECRET),
            (WALLET_SESSION_SECRET_ENV, TEST_WALLET_SECRET),
            (REQUIRE_FIELD_ENCRYPTION_ENV, "true"),
        ]));
        assert!(matches!(result, Err(ConfigError::Missing(FIELD_ENCRYPTION_KEY_ENV))));
    }

    #[test]
    fn oracle_requires_contract_address() {
        let result = TrustConfig::from_lookup(lookup(&[
            (TOKEN_SECRET_ENV, TEST_TOKEN_SECRET),
            (WALLET_SESSION_SECRET_ENV, TEST_WALLET_SECRET),
            (ORACLE_PRIVATE_KEY_ENV, "0x01"),
        ]));
        assert!(matches!(result, Err(ConfigError::Missing(REWARD_CONTRACT_ADDRESS_ENV))));
    }

    #[test]
    fn non_positive_ttl_is_rejected() {
        let result = TrustConfig::from_lookup(lookup(&[
            (TOKEN_SECRET_ENV, TEST_TOKEN_SECRET),
            (WALLET_SESSION_SECRET_ENV, TEST_WALLET_SECRET),
            (CHALLENGE_TTL_ENV, "0"),
        ]));
        assert!(matches!(result, Err(ConfigError::Invalid { var: CHALLENGE_TTL_ENV, .. })));
    }

    #[test]
    fn oversized_ttl_is_rejected() {
        for huge in ["9223372036854775807", "2592001"] {
            let result = TrustConfig::from_lookup(lookup(&[
                (TOKEN_SECRET_ENV, TEST_TOKEN_SECRET),
                (WALLET_SESSION_SECRET_ENV, TEST_WALLET_SECRET),
                (SESSION_TTL_ENV, huge),
            ]));
            assert!(matches!(result, Err(ConfigError::Invalid { var: SESSION_TTL_ENV, .. })));
        }

        let result = TrustConfig::from_lookup(lookup(&[
            (TOKEN_SECRET_ENV, TEST_TOKEN_SECRET),
            (WALLET_SESSION_SECRET_ENV, TEST_WALLET_SECRET),
            (PROVIDER_SESSION_TTL_ENV, "2592000"),
        ]));
        assert_eq!(result.unwrap().provider_session_ttl, Duration::seconds(MAX_TTL_SECS));
    }

    #[test]
    fn oracle_key_debug_is_redacted() {
        let source = OracleKeySource::Hex(Zeroizing::new("deadbeef".to_string()));
        assert_eq!(format!("{source:?}"), "Hex([REDACTED])");
    }
}
