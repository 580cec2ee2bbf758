// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Provider linking with a detached Ed25519 key.
//!
//! The provider DID is derived from its public key
//! (`did:hcn:ed25519:<base64url(SHA-256(key))>`), so presenting a key binds
//! it to exactly one identity. Key material is checked against the claimed
//! DID before any signature is looked at.
//!
//! Challenges are kept after use with `used_at` stamped, which lets a second
//! attempt be told apart (409) from an unknown (404) or stale (410) one.
//! Expired records are swept whenever a new challenge is issued.

use chrono::{DateTime, SecondsFormat, Utc};
use ed25519_dalek::{Signature, VerifyingKey, PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH};
use uuid::Uuid;

use super::did::{provider_did, validate_provider_did};
use crate::auth::sessions::{IssuedSession, SessionError, SessionIssuer};
use crate::auth::token::{TokenCodecs, TokenError};
use crate::config::TrustConfig;
use crate::crypto::secrets::{b64url_decode, b64url_encode, random_bytes};
use crate::storage::{ChallengeRepository, StorageError, StoredProviderChallenge, TrustDatabase};

/// Signature algorithm advertised to providers.
pub const PROVIDER_ALGORITHM: &str = "Ed25519";

#[derive(Debug, thiserror::Error)]
pub enum ProviderLinkError {
    #[error("malformed request: {0}")]
    Malformed(&'static str),

    #[error("challenge not found")]
    NotFound,

    #[error("DID does not match the challenge")]
    DidMismatch,

    #[error("challenge already used")]
    AlreadyUsed,

    #[error("challenge expired")]
    Expired,

    #[error("public key does not match the DID")]
    KeyMismatch,

    #[error("signature verification failed")]
    InvalidSignature,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Token(#[from] TokenError),
}

impl From<SessionError> for ProviderLinkError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Storage(e) => ProviderLinkError::Storage(e),
            SessionError::Token(e) => ProviderLinkError::Token(e),
        }
    }
}

/// Caller-supplied values for a verification attempt.
#[derive(Debug, Clone)]
pub struct ProviderProof<'a> {
    pub challenge_id: &'a str,
    pub did: &'a str,
    /// base64url or hex encoded 32-byte key
    pub public_key: &'a str,
    /// base64url or hex encoded 64-byte signature
    pub signature: &'a str,
    pub scopes: &'a [String],
}

pub struct ProviderLinker<'a> {
    db: &'a TrustDatabase,
    codecs: &'a TokenCodecs,
    config: &'a TrustConfig,
}

impl<'a> ProviderLinker<'a> {
    pub fn new(db: &'a TrustDatabase, codecs: &'a TokenCodecs, config: &'a TrustConfig) -> Self {
        Self { db, codecs, config }
    }

    /// Issue a challenge for `did`. Expired challenges are swept first.
    pub fn create_challenge(
        &self,
        did: &str,
    ) -> Result<StoredProviderChallenge, ProviderLinkError> {
        validate_provider_did(did).map_err(|_| ProviderLinkError::Malformed("invalid DID"))?;

        let challenges = ChallengeRepository::new(self.db);
        let now = Utc::now();
        let swept = challenges.sweep_expired_provider(now)?;
        if swept > 0 {
            tracing::debug!(swept, "Expired provider challenges removed");
        }

        let id = Uuid::new_v4().to_string();
        let nonce = b64url_encode(&random_bytes::<32>());
        let expires_at = now + self.config.challenge_ttl;
        let statement =
            build_statement(&self.config.siwe_domain, did, &nonce, &id, now, expires_at);

        let challenge = StoredProviderChallenge {
            id,
            did: did.to_string(),
            nonce,
            statement,
            issued_at: now,
            expires_at,
            used_at: None,
        };
        challenges.insert_provider(&challenge)?;

        tracing::info!(challenge_id = %challenge.id, did, "Provider challenge issued");
        Ok(challenge)
    }

    /// Verify a signed provider challenge and mint a provider session.
    pub fn verify(&self, proof: &ProviderProof<'_>) -> Result<IssuedSession, ProviderLinkError> {
        let public_key: [u8; PUBLIC_KEY_LENGTH] = decode_fixed(proof.public_key)
            .ok_or(ProviderLinkError::Malformed("invalid public key encoding"))?;
        let signature: [u8; SIGNATURE_LENGTH] = decode_fixed(proof.signature)
            .ok_or(ProviderLinkError::Malformed("invalid signature encoding"))?;

        let now = Utc::now();
        let did = ChallengeRepository::new(self.db).redeem_provider(
            proof.challenge_id,
            now,
            |stored| -> Result<String, ProviderLinkError> {
                let challenge = stored.ok_or(ProviderLinkError::NotFound)?;
                check_challenge(challenge, proof.did, &public_key, &signature, now)?;
                Ok(challenge.did.clone())
            },
        )?;

        let issuer = SessionIssuer::new(
            self.db,
            self.codecs,
            self.config.session_ttl,
            self.config.provider_session_ttl,
        );
        let session = issuer.issue_provider(&did, proof.scopes)?;

        tracing::info!(challenge_id = proof.challenge_id, did = %did, "Provider verified");
        Ok(session)
    }
}

fn check_challenge(
    challenge: &StoredProviderChallenge,
    did: &str,
    public_key: &[u8; PUBLIC_KEY_LENGTH],
    signature: &[u8; SIGNATURE_LENGTH],
    now: DateTime<Utc>,
) -> Result<(), ProviderLinkError> {
    if challenge.did != did {
        return Err(ProviderLinkError::DidMismatch);
    }
    if challenge.used_at.is_some() {
        return Err(ProviderLinkError::AlreadyUsed);
    }
    if challenge.expires_at <= now {
        return Err(ProviderLinkError::Expired);
    }
    if provider_did(public_key) != challenge.did {
        return Err(ProviderLinkError::KeyMismatch);
    }

    let key = VerifyingKey::from_bytes(public_key)
        .map_err(|_| ProviderLinkError::Malformed("invalid public key"))?;
    let signature = Signature::from_bytes(signature);
    key.verify_strict(challenge.statement.as_bytes(), &signature)
        .map_err(|_| ProviderLinkError::InvalidSignature)
}

/// Decode base64url (unpadded) or hex into a fixed-size array.
fn decode_fixed<const N: usize>(value: &str) -> Option<[u8; N]> {
    let value = value.trim();
    let bytes = if value.len() == N * 2 && value.bytes().all(|b| b.is_ascii_hexdigit()) {
        alloy::hex::decode(value).ok()?
    } else {
        b64url_decode(value.trim_end_matches('='))?
    };
    bytes.try_into().ok()
}

fn build_statement(
    domain: &str,
    did: &str,
    nonce: &str,
    challenge_id: &str,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> String {
    format!(
        "{domain} provider link request\n\
         \n\
         DID: {did}\n\
         Nonce: {nonce}\n\
         Challenge ID: {challenge_id}\n\
         Issued At: {issued}\n\
         Expiration Time: {expires}",
        issued = issued_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        expires = expires_at.to_rfc3339_opts(SecondsFormat::Secs, true),
    )
}
