// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Reward Claim Oracle
//!
//! Signs reward claims that a wallet-linked subject redeems on-chain.
//!
//! ## Claim Digest
//!
//! ```text
//! claimId = keccak256("<subject>:<activityType>:<proofId>")
//! digest  = keccak256(abi.encodePacked(
//!               contract, chainId, wallet, claimId, amount, reputationPoints))
//! signature = EIP-191 personal_sign(digest) by the oracle key
//! ```
//!
//! The contract address and chain id in the digest keep a signature from
//! being replayed against another deployment. A persisted marker per
//! `subject:activityType:proofId` stops the oracle from signing the same
//! proof twice; it is an idempotency guard, not a redemption ledger.

use std::collections::BTreeMap;
use std::fs;
use std::str::FromStr;

use alloy::{
    primitives::{keccak256, Address, B256, U256},
    signers::{local::PrivateKeySigner, SignerSync},
    sol_types::SolValue,
};
use chrono::Utc;
use k256::SecretKey;
use serde::{Deserialize, Serialize};

use crate::config::{OracleConfig, OracleKeySource};
use crate::identity::did::{lowercase_address, parse_address};
use crate::storage::{ClaimMarkerRepository, StorageError, StoredClaimMarker, TrustDatabase};

const MAX_PROOF_ID_LEN: usize = 128;

#[derive(Debug, thiserror::Error)]
pub enum RewardError {
    #[error("reward oracle is not configured")]
    NotConfigured,

    #[error("unknown activity type '{0}'")]
    UnknownActivity(String),

    #[error("proof id must be 1-{MAX_PROOF_ID_LEN} characters")]
    InvalidProofId,

    #[error("no wallet linked to this account")]
    WalletNotLinked,

    #[error("reward already claimed for this proof")]
    AlreadyClaimed,

    #[error("invalid oracle key: {0}")]
    InvalidKey(String),

    #[error("invalid contract address")]
    InvalidContract,

    #[error("signing failed: {0}")]
    Signing(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Reward granted for one activity type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RewardRule {
    /// Token amount in base units
    pub amount: u128,
    pub reputation_points: u64,
}

/// Activity type to reward.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct RewardTable(BTreeMap<String, RewardRule>);

const ONE_TOKEN: u128 = 1_000_000_000_000_000_000;

impl Default for RewardTable {
    fn default() -> Self {
        let rules = [
            ("post_created", ONE_TOKEN, 5),
            ("comment_created", ONE_TOKEN / 4, 1),
            ("profile_completed", 5 * ONE_TOKEN, 20),
            ("referral_joined", 10 * ONE_TOKEN, 50),
        ];
        Self(
            rules
                .into_iter()
                .map(|(activity, amount, reputation_points)| {
                    (
                        activity.to_string(),
                        RewardRule {
                            amount,
                            reputation_points,
                        },
                    )
                })
                .collect(),
        )
    }
}

impl RewardTable {
    pub fn rule(&self, activity_type: &str) -> Option<RewardRule> {
        self.0.get(activity_type).copied()
    }
}

/// A claim ready for on-chain redemption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedClaim {
    pub claim_id: B256,
    pub digest: B256,
    pub amount: u128,
    pub reputation_points: u64,
    /// Lowercase `0x` address
    pub wallet_address: String,
    pub chain_id: u64,
    pub contract_address: Address,
    /// `0x`-prefixed 65-byte signature
    pub signature: String,
    pub signer: Address,
}

/// Holds the oracle key for the process lifetime.
pub struct RewardOracle {
    signer: PrivateKeySigner,
    contract: Address,
    chain_id: u64,
    rewards: RewardTable,
}

impl std::fmt::Debug for RewardOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RewardOracle")
            .field("signer", &self.signer.address())
            .field("contract", &self.contract)
            .field("chain_id", &self.chain_id)
            .finish_non_exhaustive()
    }
}

impl RewardOracle {
    pub fn new(
        signer: PrivateKeySigner,
        contract: Address,
        chain_id: u64,
        rewards: RewardTable,
    ) -> Self {
        Self {
            signer,
            contract,
            chain_id,
            rewards,
        }
    }

    pub fn from_config(config: &OracleConfig) -> Result<Self, RewardError> {
        let signer = match &config.key {
            OracleKeySource::Hex(hex) => signer_from_hex(hex)?,
            OracleKeySource::PemFile(path) => {
                let pem_bytes = fs::read(path)
                    .map_err(|e| RewardError::InvalidKey(format!("{}: {e}", path.display())))?;
                signer_from_pem(&pem_bytes)?
            }
        };
        let contract = parse_address(&config.contract_address)
            .map_err(|_| RewardError::InvalidContract)?;

        tracing::info!(
            signer = %signer.address(),
            contract = %contract,
            chain_id = config.chain_id,
            "Reward oracle ready"
        );
        Ok(Self::new(signer, contract, config.chain_id, config.rewards.clone()))
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Sign a reward claim for `wallet`, at most once per proof.
    pub fn claim(
        &self,
        db: &TrustDatabase,
        subject_id: &str,
        wallet: &Address,
        activity_type: &str,
        proof_id: &str,
    ) -> Result<SignedClaim, RewardError> {
        let rule = self
            .rewards
            .rule(activity_type)
            .ok_or_else(|| RewardError::UnknownActivity(activity_type.to_string()))?;
        let proof_id = proof_id.trim();
        if proof_id.is_empty() || proof_id.chars().count() > MAX_PROOF_ID_LEN {
            return Err(RewardError::InvalidProofId);
        }

        let marker = format!("{subject_id}:{activity_type}:{proof_id}");
        let claim_id = keccak256(marker.as_bytes());

        let markers = ClaimMarkerRepository::new(db);
        let fresh = markers.mark_once(&StoredClaimMarker {
            marker: marker.clone(),
            claim_id: claim_id.to_string(),
            subject_id: subject_id.to_string(),
            claimed_at: Utc::now(),
        })?;
        if !fresh {
            return Err(RewardError::AlreadyClaimed);
        }

        let digest = self.digest(wallet, claim_id, rule);
        let signature = match self.signer.sign_message_sync(digest.as_slice()) {
            Ok(signature) => signature,
            Err(e) => {
                if let Err(release) = markers.release(&marker) {
                    tracing::warn!(error = %release, "Failed to release claim marker");
                }
                return Err(RewardError::Signing(e.to_string()));
            }
        };

        tracing::info!(subject_id, activity_type, claim_id = %claim_id, "Reward claim signed");
        Ok(SignedClaim {
            claim_id,
            digest,
            amount: rule.amount,
            reputation_points: rule.reputation_points,
            wallet_address: lowercase_address(wallet),
            chain_id: self.chain_id,
            contract_address: self.contract,
            signature: format!("0x{}", alloy::hex::encode(signature.as_bytes())),
            signer: self.signer.address(),
        })
    }

    /// keccak256 of the packed claim tuple.
    pub fn digest(&self, wallet: &Address, claim_id: B256, rule: RewardRule) -> B256 {
        let packed = (
            self.contract,
            U256::from(self.chain_id),
            *wallet,
            claim_id,
            U256::from(rule.amount),
            U256::from(rule.reputation_points),
        )
            .abi_encode_packed();
        keccak256(packed)
    }
}

pub(crate) fn signer_from_hex(hex: &str) -> Result<PrivateKeySigner, RewardError> {
    PrivateKeySigner::from_str(hex.trim()).map_err(|e| RewardError::InvalidKey(e.to_string()))
}

/// Parse a SEC1 or PKCS#8 PEM secp256k1 key into a signer.
pub fn signer_from_pem(pem_bytes: &[u8]) -> Result<PrivateKeySigner, RewardError> {
    use k256::pkcs8::DecodePrivateKey;

    let pem_str = std::str::from_utf8(pem_bytes)
        .map_err(|e| RewardError::InvalidKey(format!("Invalid UTF-8: {e}")))?;
    let pem =
        pem::parse(pem_str).map_err(|e| RewardError::InvalidKey(format!("Invalid PEM: {e}")))?;

    let secret_key = SecretKey::from_sec1_der(pem.contents())
        .or_else(|_| SecretKey::from_pkcs8_der(pem.contents()))
        .map_err(|e| RewardError::InvalidKey(format!("Invalid key format: {e}")))?;

    PrivateKeySigner::from_bytes(&B256::from_slice(&secret_key.to_bytes()))
        .map_err(|e| RewardError::InvalidKey(e.to_string()))
}
