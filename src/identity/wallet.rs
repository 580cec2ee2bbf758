// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet linking (SIWE-style challenge/response).
//!
//! ## Flow
//!
//! 1. An authenticated subject asks for a challenge for `(address, chainId)`
//! 2. The server stores an EIP-4361-style statement keyed by a random nonce
//! 3. The wallet signs the statement (EIP-191 personal message)
//! 4. The server recovers the signer, runs every cross-check and, in the same
//!    write transaction, deletes the challenge
//! 5. The `did:pkh` identity is bound to the subject, and a provider session
//!    plus a wallet session cookie are minted
//!
//! Every cross-check is mandatory: skipping any one of them reopens a
//! forgery path.

use alloy::primitives::{Address, Signature};
use chrono::{DateTime, SecondsFormat, Utc};
use url::Url;
use uuid::Uuid;

use super::did::{lowercase_address, parse_address, parse_pkh_did, pkh_did, DidError};
use super::scopes::DEFAULT_SCOPE;
use crate::auth::sessions::{IssuedSession, SessionError, SessionIssuer};
use crate::auth::token::{IssuedToken, TokenCodecs, TokenError, WalletSessionClaims};
use crate::config::TrustConfig;
use crate::crypto::{secrets::random_bytes, FieldCipher, FieldCipherError};
use crate::storage::{
    ChallengeRepository, IdentityRepository, LinkOutcome, LinkedIdentity, StorageError,
    StoredWalletChallenge, TrustDatabase,
};

/// Field name bound into the wallet address envelope.
pub const WALLET_ADDRESS_FIELD: &str = "wallet_address";

const STATEMENT: &str = "Link this wallet to your account.";
const EIP191_SIGNATURE_LEN: usize = 65;

#[derive(Debug, thiserror::Error)]
pub enum WalletLinkError {
    #[error("malformed request: {0}")]
    Malformed(&'static str),

    #[error("challenge not found or expired")]
    NotFoundOrExpired,

    #[error("challenge was issued to a different account")]
    SubjectMismatch,

    #[error("message does not match the issued challenge")]
    MessageMismatch,

    #[error("address does not match the challenge")]
    AddressMismatch,

    #[error("chain id does not match the challenge")]
    ChainMismatch,

    #[error("DID does not match the challenge")]
    DidMismatch,

    #[error("request id does not match the challenge")]
    RequestIdMismatch,

    #[error("malformed signature")]
    MalformedSignature,

    #[error("signature was not produced by the challenged address")]
    SignatureMismatch,

    #[error("wallet is already linked to another account")]
    DidClaimed,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    FieldCipher(#[from] FieldCipherError),

    #[error(transparent)]
    Token(#[from] TokenError),
}

impl From<DidError> for WalletLinkError {
    fn from(err: DidError) -> Self {
        match err {
            DidError::InvalidAddress => WalletLinkError::Malformed("invalid address"),
            DidError::InvalidChainId => WalletLinkError::Malformed("invalid chain id"),
            DidError::InvalidDid => WalletLinkError::Malformed("invalid DID"),
        }
    }
}

impl From<SessionError> for WalletLinkError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Storage(e) => WalletLinkError::Storage(e),
            SessionError::Token(e) => WalletLinkError::Token(e),
        }
    }
}

/// Caller-supplied values for a verification attempt.
#[derive(Debug, Clone)]
pub struct WalletProof<'a> {
    pub message: &'a str,
    pub signature: &'a str,
    pub address: &'a str,
    pub chain_id: u64,
    pub did: Option<&'a str>,
    pub request_id: Option<&'a str>,
}

/// Outcome of a successful verification.
#[derive(Debug, Clone)]
pub struct WalletLink {
    pub did: String,
    /// Lowercase `0x` address
    pub address: String,
    pub chain_id: u64,
    pub verified_at: DateTime<Utc>,
    pub provider: IssuedSession,
    pub wallet_session: IssuedToken,
}

/// Fields read back out of a challenge statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementFields {
    pub address: String,
    pub chain_id: u64,
    pub nonce: String,
    pub request_id: Option<String>,
}

pub struct WalletLinker<'a> {
    db: &'a TrustDatabase,
    codecs: &'a TokenCodecs,
    cipher: &'a FieldCipher,
    config: &'a TrustConfig,
}

impl<'a> WalletLinker<'a> {
    pub fn new(
        db: &'a TrustDatabase,
        codecs: &'a TokenCodecs,
        cipher: &'a FieldCipher,
        config: &'a TrustConfig,
    ) -> Self {
        Self {
            db,
            codecs,
            cipher,
            config,
        }
    }

    /// Issue a single-use challenge for `subject_id` to sign with `address`.
    pub fn create_challenge(
        &self,
        subject_id: &str,
        address: &str,
        chain_id: u64,
        did: Option<&str>,
    ) -> Result<StoredWalletChallenge, WalletLinkError> {
        let address = parse_address(address)?;
        if chain_id == 0 {
            return Err(DidError::InvalidChainId.into());
        }
        let expected_did = pkh_did(chain_id, &address);
        if let Some(did) = did {
            if parse_pkh_did(did)? != (chain_id, address) {
                return Err(WalletLinkError::DidMismatch);
            }
        }

        let identities = IdentityRepository::new(self.db);
        if identities
            .subject_for_did(&expected_did)?
            .is_some_and(|owner| owner != subject_id)
        {
            return Err(WalletLinkError::DidClaimed);
        }

        let challenges = ChallengeRepository::new(self.db);
        let now = Utc::now();
        let swept = challenges.sweep_expired_wallet(now)?;
        if swept > 0 {
            tracing::debug!(swept, "Expired wallet challenges removed");
        }

        let nonce = alloy::hex::encode(random_bytes::<16>());
        let request_id = Uuid::new_v4().to_string();
        let expires_at = now + self.config.challenge_ttl;
        let message = build_statement(
            &self.config.siwe_domain,
            &self.config.siwe_uri,
            &address,
            chain_id,
            &nonce,
            now,
            expires_at,
            &request_id,
        );

        let challenge = StoredWalletChallenge {
            nonce,
            request_id,
            subject_id: subject_id.to_string(),
            did: expected_did,
            address: lowercase_address(&address),
            chain_id,
            message,
            issued_at: now,
            expires_at,
        };
        challenges.insert_wallet(&challenge)?;

        tracing::info!(
            subject_id,
            request_id = %challenge.request_id,
            chain_id,
            "Wallet challenge issued"
        );
        Ok(challenge)
    }

    /// Verify a signed challenge and link the wallet to `subject_id`.
    ///
    /// Expired challenges are swept here as well as on issue, so a table
    /// that only sees verifications still drains.
    pub fn verify(
        &self,
        subject_id: &str,
        proof: &WalletProof<'_>,
    ) -> Result<WalletLink, WalletLinkError> {
        let fields = parse_statement(proof.message)
            .ok_or(WalletLinkError::Malformed("unrecognized message"))?;
        let caller_address = parse_address(proof.address)?;
        let signature = decode_signature(proof.signature)?;

        let challenges = ChallengeRepository::new(self.db);
        let now = Utc::now();
        let swept = challenges.sweep_expired_wallet(now)?;
        if swept > 0 {
            tracing::debug!(swept, "Expired wallet challenges removed");
        }

        let challenge = challenges.consume_wallet(
            &fields.nonce,
            |stored| -> Result<StoredWalletChallenge, WalletLinkError> {
                let challenge = stored.ok_or(WalletLinkError::NotFoundOrExpired)?;
                check_challenge(
                    challenge,
                    subject_id,
                    proof,
                    &fields,
                    &caller_address,
                    &signature,
                    now,
                )?;
                Ok(challenge.clone())
            },
        )?;

        self.complete_link(subject_id, challenge, now)
    }

    fn complete_link(
        &self,
        subject_id: &str,
        challenge: StoredWalletChallenge,
        verified_at: DateTime<Utc>,
    ) -> Result<WalletLink, WalletLinkError> {
        let identity = LinkedIdentity {
            subject_id: subject_id.to_string(),
            did: challenge.did.clone(),
            chain_id: challenge.chain_id,
            wallet_address: self.cipher.encrypt(WALLET_ADDRESS_FIELD, &challenge.address)?,
            linked_at: verified_at,
        };
        if IdentityRepository::new(self.db).link(&identity)? == LinkOutcome::ClaimedByOther {
            return Err(WalletLinkError::DidClaimed);
        }

        let issuer = SessionIssuer::new(
            self.db,
            self.codecs,
            self.config.session_ttl,
            self.config.provider_session_ttl,
        );
        let provider = issuer.issue_provider(&challenge.did, &[DEFAULT_SCOPE.to_string()])?;

        let wallet_session = self.codecs.wallet_session.issue(
            WalletSessionClaims {
                sub: subject_id.to_string(),
                address: challenge.address.clone(),
                chain_id: challenge.chain_id,
                did: challenge.did.clone(),
                verified_at: verified_at.timestamp(),
            },
            self.config.provider_session_ttl,
        )?;

        tracing::info!(subject_id, did = %challenge.did, "Wallet linked");
        Ok(WalletLink {
            did: challenge.did,
            address: challenge.address,
            chain_id: challenge.chain_id,
            verified_at,
            provider,
            wallet_session,
        })
    }
}

/// All cross-checks of one verification attempt. Runs inside the
/// consume transaction; the challenge is deleted only if this passes.
fn check_challenge(
    challenge: &StoredWalletChallenge,
    subject_id: &str,
    proof: &WalletProof<'_>,
    fields: &StatementFields,
    caller_address: &Address,
    signature: &Signature,
    now: DateTime<Utc>,
) -> Result<(), WalletLinkError> {
    if challenge.expires_at <= now {
        return Err(WalletLinkError::NotFoundOrExpired);
    }
    if challenge.subject_id != subject_id {
        return Err(WalletLinkError::SubjectMismatch);
    }
    if challenge.message.as_bytes() != proof.message.as_bytes() {
        return Err(WalletLinkError::MessageMismatch);
    }

    let bound_address = parse_address(&challenge.address)?;
    let message_address = parse_address(&fields.address)?;
    if message_address != bound_address || *caller_address != bound_address {
        return Err(WalletLinkError::AddressMismatch);
    }
    if fields.chain_id != challenge.chain_id || proof.chain_id != challenge.chain_id {
        return Err(WalletLinkError::ChainMismatch);
    }
    if proof.did.is_some_and(|did| !did.eq_ignore_ascii_case(&challenge.did)) {
        return Err(WalletLinkError::DidMismatch);
    }
    if fields.request_id.as_deref() != Some(challenge.request_id.as_str())
        || proof.request_id.is_some_and(|id| id != challenge.request_id)
    {
        return Err(WalletLinkError::RequestIdMismatch);
    }

    let recovered = signature
        .recover_address_from_msg(proof.message.as_bytes())
        .map_err(|_| WalletLinkError::SignatureMismatch)?;
    if recovered != bound_address {
        return Err(WalletLinkError::SignatureMismatch);
    }
    Ok(())
}

/// Decode a `0x`-prefixed 65-byte `r || s || v` signature.
pub fn decode_signature(value: &str) -> Result<Signature, WalletLinkError> {
    let hex = value.strip_prefix("0x").unwrap_or(value);
    let bytes = alloy::hex::decode(hex).map_err(|_| WalletLinkError::MalformedSignature)?;
    if bytes.len() != EIP191_SIGNATURE_LEN {
        return Err(WalletLinkError::MalformedSignature);
    }
    Signature::try_from(bytes.as_slice()).map_err(|_| WalletLinkError::MalformedSignature)
}

/// Compose the EIP-4361-style statement a wallet signs.
#[allow(clippy::too_many_arguments)]
pub fn build_statement(
    domain: &str,
    uri: &Url,
    address: &Address,
    chain_id: u64,
    nonce: &str,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    request_id: &str,
) -> String {
    format!(
        "{domain} wants you to sign in with your Ethereum account:\n\
         {address}\n\
         \n\
         {STATEMENT}\n\
         \n\
         URI: {uri}\n\
         Version: 1\n\
         Chain ID: {chain_id}\n\
         Nonce: {nonce}\n\
         Issued At: {issued}\n\
         Expiration Time: {expires}\n\
         Request ID: {request_id}",
        address = address.to_checksum(None),
        uri = uri.as_str(),
        issued = issued_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        expires = expires_at.to_rfc3339_opts(SecondsFormat::Secs, true),
    )
}

/// Re-extract the address, chain id, nonce and request id from a statement.
pub fn parse_statement(message: &str) -> Option<StatementFields> {
    let mut lines = message.lines();
    lines
        .next()
        .filter(|l| l.ends_with(" wants you to sign in with your Ethereum account:"))?;
    let address = lines.next()?.trim().to_string();

    let field = |name: &str| {
        let prefix = format!("{name}: ");
        message
            .lines()
            .find_map(|line| line.strip_prefix(prefix.as_str()))
            .map(|v| v.trim().to_string())
    };

    let nonce = field("Nonce")
        .filter(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_alphanumeric()))?;
    let chain_id = field("Chain ID")?.parse().ok()?;

    Some(StatementFields {
        address,
        chain_id,
        nonce,
        request_id: field("Request ID"),
    })
}
