// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared application state.
//!
//! Every long-lived handle (database, codecs, cipher, oracle key) is built
//! once at startup and handed to the core through this struct.

use std::sync::Arc;

use axum::http::{HeaderMap, Method, Uri};

use crate::auth::{IdentityGate, PasswordAuthenticator, SessionIssuer, TokenCodecs};
use crate::config::{StorageBackend, TrustConfig};
use crate::crypto::{
    secrets::{derive_subkey, Key32},
    FieldCipher, FieldCipherError,
};
use crate::identity::{ProviderLinker, WalletLinker};
use crate::rewards::{RewardError, RewardOracle};
use crate::storage::{
    AuditRequest, AuditSink, Auditor, FileAuditSink, StorageError, TracingAuditSink, TrustDatabase,
};

const AUDIT_PSEUDONYM_LABEL: &str = "hcn/audit-pseudonym/v1";

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    FieldCipher(#[from] FieldCipherError),

    #[error(transparent)]
    Oracle(#[from] RewardError),

    #[error("failed to create data directory: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<TrustDatabase>,
    pub codecs: Arc<TokenCodecs>,
    pub cipher: Arc<FieldCipher>,
    pub auditor: Auditor,
    pub config: Arc<TrustConfig>,
    pub oracle: Option<Arc<RewardOracle>>,
    audit_key: Arc<Key32>,
}

impl AppState {
    pub fn new(
        config: TrustConfig,
        db: TrustDatabase,
        auditor: Auditor,
        oracle: Option<RewardOracle>,
    ) -> Result<Self, StateError> {
        let cipher = FieldCipher::from_config(&config)?;
        Ok(Self {
            db: Arc::new(db),
            codecs: Arc::new(TokenCodecs::from_config(&config)),
            cipher: Arc::new(cipher),
            auditor,
            audit_key: Arc::new(derive_subkey(&config.token_secret, AUDIT_PSEUDONYM_LABEL)),
            oracle: oracle.map(Arc::new),
            config: Arc::new(config),
        })
    }

    /// Open storage, audit sinks and the oracle key described by `config`.
    pub fn from_config(config: TrustConfig) -> Result<Self, StateError> {
        let paths = config.storage_paths();
        let mut sinks: Vec<Arc<dyn AuditSink>> = vec![Arc::new(TracingAuditSink)];

        let db = match config.storage_backend {
            StorageBackend::Redb => {
                std::fs::create_dir_all(paths.root())?;
                sinks.push(Arc::new(FileAuditSink::new(paths.clone())));
                TrustDatabase::open(&paths.database())?
            }
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; sessions are lost on restart");
                TrustDatabase::in_memory()?
            }
        };

        let oracle = config.oracle.as_ref().map(RewardOracle::from_config).transpose()?;
        if oracle.is_none() {
            tracing::info!("Reward oracle disabled (no key configured)");
        }

        Self::new(config, db, Auditor::new(sinks), oracle)
    }

    pub fn gate(&self) -> IdentityGate<'_> {
        IdentityGate::new(&self.db, &self.codecs, self.config.enforce_session_binding)
    }

    pub fn issuer(&self) -> SessionIssuer<'_> {
        SessionIssuer::new(
            &self.db,
            &self.codecs,
            self.config.session_ttl,
            self.config.provider_session_ttl,
        )
    }

    pub fn passwords(&self) -> PasswordAuthenticator<'_> {
        PasswordAuthenticator::new(&self.db, &self.config.token_secret)
    }

    pub fn wallet_linker(&self) -> WalletLinker<'_> {
        WalletLinker::new(&self.db, &self.codecs, &self.cipher, &self.config)
    }

    pub fn provider_linker(&self) -> ProviderLinker<'_> {
        ProviderLinker::new(&self.db, &self.codecs, &self.config)
    }

    /// Request attributes for an audit event, pseudonymized with the
    /// process audit key.
    pub fn audit_request(&self, method: &Method, uri: &Uri, headers: &HeaderMap) -> AuditRequest {
        AuditRequest::from_http(method, uri, headers, self.audit_key.as_slice())
    }
}

#[cfg(test)]
impl AppState {
    /// In-memory state with the shared test configuration.
    pub(crate) fn for_tests() -> Self {
        Self::for_tests_with_sink(Arc::new(crate::storage::MemoryAuditSink::default()))
    }

    pub(crate) fn for_tests_with_sink(sink: Arc<dyn AuditSink>) -> Self {
        let config = crate::config::tests::test_config();
        let db = TrustDatabase::in_memory().expect("in-memory database");
        Self::new(config, db, Auditor::new(vec![sink]), None).expect("test state")
    }
}
