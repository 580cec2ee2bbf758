// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Persisted single-use challenges for wallet and provider linking.
//!
//! Consumption runs inside one write transaction: the lookup, the caller's
//! checks and the delete (wallet) or `used_at` stamp (provider) either all
//! commit or none do. Two concurrent verifications of the same challenge can
//! therefore never both succeed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::database::{
    RecordAction, StorageError, StorageResult, TrustDatabase, PROVIDER_CHALLENGES,
    WALLET_CHALLENGES,
};

/// Wallet (SIWE-style) challenge, keyed by nonce.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredWalletChallenge {
    pub nonce: String,
    pub request_id: String,
    /// Subject that requested the challenge; only it may redeem it
    pub subject_id: String,
    pub did: String,
    /// Lowercase 0x-prefixed address
    pub address: String,
    pub chain_id: u64,
    /// Exact statement the wallet must sign
    pub message: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Detached-key provider challenge, keyed by id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredProviderChallenge {
    pub id: String,
    pub did: String,
    pub nonce: String,
    pub statement: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_at: Option<DateTime<Utc>>,
}

/// Repository for challenge records.
pub struct ChallengeRepository<'a> {
    db: &'a TrustDatabase,
}

impl<'a> ChallengeRepository<'a> {
    pub fn new(db: &'a TrustDatabase) -> Self {
        Self { db }
    }

    // ========== Wallet Challenges ==========

    pub fn insert_wallet(&self, challenge: &StoredWalletChallenge) -> StorageResult<()> {
        self.db.insert_new(WALLET_CHALLENGES, &challenge.nonce, challenge)
    }

    pub fn get_wallet(&self, nonce: &str) -> StorageResult<Option<StoredWalletChallenge>> {
        self.db.get(WALLET_CHALLENGES, nonce)
    }

    /// Drop wallet challenges that expired before `now`.
    pub fn sweep_expired_wallet(&self, now: DateTime<Utc>) -> StorageResult<usize> {
        self.db
            .remove_where(WALLET_CHALLENGES, |c: &StoredWalletChallenge| c.expires_at <= now)
    }

    /// Atomically validate and delete a wallet challenge.
    ///
    /// `check` receives the stored challenge (or `None`). The challenge is
    /// deleted only if `check` succeeds.
    pub fn consume_wallet<R, E>(
        &self,
        nonce: &str,
        check: impl FnOnce(Option<&StoredWalletChallenge>) -> Result<R, E>,
    ) -> Result<R, E>
    where
        E: From<StorageError>,
    {
        self.db
            .transact(WALLET_CHALLENGES, nonce, |current: Option<StoredWalletChallenge>| {
                let result = check(current.as_ref())?;
                Ok((RecordAction::Remove, result))
            })
    }

    // ========== Provider Challenges ==========

    pub fn insert_provider(&self, challenge: &StoredProviderChallenge) -> StorageResult<()> {
        self.db.insert_new(PROVIDER_CHALLENGES, &challenge.id, challenge)
    }

    pub fn get_provider(
        &self,
        challenge_id: &str,
    ) -> StorageResult<Option<StoredProviderChallenge>> {
        self.db.get(PROVIDER_CHALLENGES, challenge_id)
    }

    /// Drop provider challenges that expired before `now`, used or not.
    pub fn sweep_expired_provider(&self, now: DateTime<Utc>) -> StorageResult<usize> {
        self.db
            .remove_where(PROVIDER_CHALLENGES, |c: &StoredProviderChallenge| c.expires_at <= now)
    }

    /// Atomically validate a provider challenge and stamp `used_at`.
    ///
    /// The record is kept for audit; `check` is responsible for rejecting a
    /// challenge whose `used_at` is already set.
    pub fn redeem_provider<R, E>(
        &self,
        challenge_id: &str,
        used_at: DateTime<Utc>,
        check: impl FnOnce(Option<&StoredProviderChallenge>) -> Result<R, E>,
    ) -> Result<R, E>
    where
        E: From<StorageError>,
    {
        self.db.transact(
            PROVIDER_CHALLENGES,
            challenge_id,
            |current: Option<StoredProviderChallenge>| {
                let result = check(current.as_ref())?;
                match current {
                    Some(mut challenge) => {
                        challenge.used_at = Some(used_at);
                        Ok((RecordAction::Put(challenge), result))
                    }
                    None => Ok((RecordAction::Keep, result)),
                }
            },
        )
    }
}
