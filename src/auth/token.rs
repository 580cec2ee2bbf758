// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Compact signed tokens.
//!
//! ## Format
//!
//! ```text
//! base64url(json payload) "." base64url(HMAC-SHA256(key, payload segment))
//! ```
//!
//! The payload carries `typ`, `iss`, `aud`, `iat`, `exp` plus the claims of
//! one protocol. Each protocol has its own claims type, its own `typ`,
//! issuer and audience, and its own key, so a token minted for one protocol
//! never verifies under another codec.
//!
//! Verification failures are deliberately indistinguishable to callers:
//! every failure is [`TokenError::InvalidOrExpired`]. The concrete cause is
//! only logged at debug level.

use std::marker::PhantomData;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::config::TrustConfig;
use crate::crypto::secrets::{
    b64url_decode, b64url_encode, constant_time_eq, derive_subkey, hmac_sha256, Key32,
};

/// Issuer embedded in every token minted by this service.
pub const TOKEN_ISSUER: &str = "hcn-trust-core";

const FIRST_PARTY_KEY_LABEL: &str = "hcn/first-party-token/v1";
const PROVIDER_KEY_LABEL: &str = "hcn/provider-token/v1";
const WALLET_SESSION_KEY_LABEL: &str = "hcn/wallet-session-cookie/v1";

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("invalid or expired token")]
    InvalidOrExpired,

    #[error("failed to encode token payload: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Claims of one token protocol.
pub trait TokenClaims: Serialize + DeserializeOwned {
    /// Value of the `typ` field.
    const TYPE: &'static str;
    /// Value of the `aud` field.
    const AUDIENCE: &'static str;
}

/// First-party bearer token claims.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FirstPartyClaims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
}

impl TokenClaims for FirstPartyClaims {
    const TYPE: &'static str = "first_party";
    const AUDIENCE: &'static str = "hcn-api";
}

/// Provider token claims.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderClaims {
    pub sid: String,
    pub did: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl TokenClaims for ProviderClaims {
    const TYPE: &'static str = "provider";
    const AUDIENCE: &'static str = "hcn-provider";
}

/// Wallet session cookie claims.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WalletSessionClaims {
    pub sub: String,
    pub address: String,
    pub chain_id: u64,
    pub did: String,
    pub verified_at: i64,
}

impl TokenClaims for WalletSessionClaims {
    const TYPE: &'static str = "wallet_session";
    const AUDIENCE: &'static str = "hcn-wallet-session";
}

#[derive(Serialize, Deserialize)]
struct SignedPayload<C> {
    typ: String,
    iss: String,
    aud: String,
    iat: i64,
    exp: i64,
    #[serde(flatten)]
    claims: C,
}

/// A freshly minted token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Claims recovered from a token whose MAC, binding and expiry checked out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken<C> {
    pub claims: C,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Issues and verifies tokens of a single protocol.
pub struct TokenCodec<C> {
    key: Key32,
    _claims: PhantomData<fn() -> C>,
}

impl<C> Clone for TokenCodec<C> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            _claims: PhantomData,
        }
    }
}

impl<C: TokenClaims> TokenCodec<C> {
    pub fn new(key: Key32) -> Self {
        Self {
            key,
            _claims: PhantomData,
        }
    }

    pub fn issue(&self, claims: C, ttl: Duration) -> Result<IssuedToken, TokenError> {
        self.issue_at(claims, ttl, Utc::now())
    }

    pub fn issue_at(
        &self,
        claims: C,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        // Whole seconds so the returned timestamps equal the embedded ones.
        let issued_at = timestamp(now.timestamp());
        let expires_at = timestamp((now + ttl).timestamp());

        let payload = SignedPayload {
            typ: C::TYPE.to_string(),
            iss: TOKEN_ISSUER.to_string(),
            aud: C::AUDIENCE.to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            claims,
        };

        let segment = b64url_encode(&serde_json::to_vec(&payload)?);
        let mac = hmac_sha256(self.key.as_slice(), segment.as_bytes());

        Ok(IssuedToken {
            token: format!("{segment}.{}", b64url_encode(&mac)),
            issued_at,
            expires_at,
        })
    }

    pub fn verify(&self, token: &str) -> Result<VerifiedToken<C>, TokenError> {
        self.verify_at(token, Utc::now())
    }

    pub fn verify_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<VerifiedToken<C>, TokenError> {
        self.check(token, now).map_err(|reason| {
            tracing::debug!(token_type = C::TYPE, reason, "Token rejected");
            TokenError::InvalidOrExpired
        })
    }

    fn check(&self, token: &str, now: DateTime<Utc>) -> Result<VerifiedToken<C>, &'static str> {
        let mut parts = token.split('.');
        let (segment, signature) = match (parts.next(), parts.next(), parts.next()) {
            (Some(p), Some(s), None) if !p.is_empty() && !s.is_empty() => (p, s),
            _ => return Err("malformed"),
        };

        let provided = b64url_decode(signature).ok_or("malformed_signature")?;
        let expected = hmac_sha256(self.key.as_slice(), segment.as_bytes());
        if !constant_time_eq(&provided, &expected) {
            return Err("bad_signature");
        }

        let raw = b64url_decode(segment).ok_or("malformed_payload")?;
        let payload: SignedPayload<C> =
            serde_json::from_slice(&raw).map_err(|_| "malformed_payload")?;

        if payload.typ != C::TYPE || payload.iss != TOKEN_ISSUER || payload.aud != C::AUDIENCE {
            return Err("wrong_protocol");
        }
        if payload.exp <= now.timestamp() || payload.iat > payload.exp {
            return Err("expired");
        }

        Ok(VerifiedToken {
            claims: payload.claims,
            issued_at: timestamp(payload.iat),
            expires_at: timestamp(payload.exp),
        })
    }
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// The three codecs, each keyed independently.
#[derive(Clone)]
pub struct TokenCodecs {
    pub first_party: TokenCodec<FirstPartyClaims>,
    pub provider: TokenCodec<ProviderClaims>,
    pub wallet_session: TokenCodec<WalletSessionClaims>,
}

impl TokenCodecs {
    /// First-party and provider keys are sub-keys of the token secret; the
    /// wallet cookie key comes from its own secret.
    pub fn from_secrets(token_secret: &[u8], wallet_session_secret: &[u8]) -> Self {
        Self {
            first_party: TokenCodec::new(derive_subkey(token_secret, FIRST_PARTY_KEY_LABEL)),
            provider: TokenCodec::new(derive_subkey(token_secret, PROVIDER_KEY_LABEL)),
            wallet_session: TokenCodec::new(derive_subkey(
                wallet_session_secret,
                WALLET_SESSION_KEY_LABEL,
            )),
        }
    }

    pub fn from_config(config: &TrustConfig) -> Self {
        Self::from_secrets(&config.token_secret, &config.wallet_session_secret)
    }
}
