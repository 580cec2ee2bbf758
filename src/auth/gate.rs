// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Canonical-identity gate.
//!
//! The single chokepoint every protected operation passes through:
//!
//! ```text
//! NoToken -> TokenInvalid -> SessionMissing -> SessionRevoked/Expired -> Authenticated
//! ```
//!
//! The [`DenialReason`] is recorded for audit only. Callers always see the
//! same 401 so a rejected token reveals nothing about which check failed.
//! Storage failures are reported separately so they surface as 503.

use super::claims::{AuthenticatedUser, ProviderPrincipal};
use super::token::TokenCodecs;
use crate::storage::{SessionKind, SessionRepository, StorageError, TrustDatabase};

/// Why a request was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    MissingOrInvalidAuthorizationHeader,
    InvalidOrExpiredSessionToken,
    SessionNotFound,
    SessionInvalid,
    InsufficientScope,
}

impl DenialReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenialReason::MissingOrInvalidAuthorizationHeader => {
                "missing_or_invalid_authorization_header"
            }
            DenialReason::InvalidOrExpiredSessionToken => "invalid_or_expired_session_token",
            DenialReason::SessionNotFound => "session_not_found",
            DenialReason::SessionInvalid => "session_invalid",
            DenialReason::InsufficientScope => "insufficient_scope",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("unauthorized ({})", .0.as_str())]
    Denied(DenialReason),

    #[error("session store unavailable: {0}")]
    StoreUnavailable(#[from] StorageError),
}

impl From<DenialReason> for GateError {
    fn from(reason: DenialReason) -> Self {
        GateError::Denied(reason)
    }
}

/// Pull the token out of an `Authorization: Bearer <token>` value.
pub fn bearer_token(authorization: Option<&str>) -> Result<&str, DenialReason> {
    let value = authorization.ok_or(DenialReason::MissingOrInvalidAuthorizationHeader)?;
    let (scheme, token) = value
        .trim()
        .split_once(' ')
        .ok_or(DenialReason::MissingOrInvalidAuthorizationHeader)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(DenialReason::MissingOrInvalidAuthorizationHeader);
    }
    Ok(token)
}

pub struct IdentityGate<'a> {
    db: &'a TrustDatabase,
    codecs: &'a TokenCodecs,
    enforce_session_binding: bool,
}

impl<'a> IdentityGate<'a> {
    pub fn new(
        db: &'a TrustDatabase,
        codecs: &'a TokenCodecs,
        enforce_session_binding: bool,
    ) -> Self {
        Self {
            db,
            codecs,
            enforce_session_binding,
        }
    }

    /// Resolve a first-party bearer token into its verified subject.
    pub fn authenticate(
        &self,
        authorization: Option<&str>,
    ) -> Result<AuthenticatedUser, GateError> {
        let token = bearer_token(authorization)?;
        let claims = self
            .codecs
            .first_party
            .verify(token)
            .map_err(|_| DenialReason::InvalidOrExpiredSessionToken)?
            .claims;

        if !self.enforce_session_binding {
            return Ok(AuthenticatedUser {
                subject_id: claims.sub,
                session_id: claims.sid,
            });
        }

        // Every token this service mints carries a session id; one without
        // it cannot be revoked and is refused while binding is enforced.
        let session_id = claims.sid.ok_or(DenialReason::SessionNotFound)?;
        let session = SessionRepository::new(self.db)
            .get_by_id(SessionKind::FirstParty, &session_id)?
            .ok_or(DenialReason::SessionNotFound)?;

        if session.subject_id != claims.sub || !session.is_live() {
            return Err(DenialReason::SessionInvalid.into());
        }

        Ok(AuthenticatedUser {
            subject_id: claims.sub,
            session_id: Some(session_id),
        })
    }

    /// Resolve a provider bearer token. Provider sessions are always bound.
    pub fn authenticate_provider(
        &self,
        authorization: Option<&str>,
    ) -> Result<ProviderPrincipal, GateError> {
        let token = bearer_token(authorization)?;
        let claims = self
            .codecs
            .provider
            .verify(token)
            .map_err(|_| DenialReason::InvalidOrExpiredSessionToken)?
            .claims;

        let session = SessionRepository::new(self.db)
            .get_by_id(SessionKind::Provider, &claims.sid)?
            .ok_or(DenialReason::SessionNotFound)?;

        if session.subject_id != claims.did || !session.is_live() {
            return Err(DenialReason::SessionInvalid.into());
        }

        Ok(ProviderPrincipal {
            session_id: session.id,
            did: session.subject_id,
            scopes: session.scopes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::sessions::SessionIssuer;
    use crate::auth::token::FirstPartyClaims;
    use chrono::Duration;

    fn codecs() -> TokenCodecs {
        TokenCodecs::from_secrets(
            b"token-secret-0123456789abcdef0123456789",
            b"wallet-secret-0123456789abcdef012345678",
        )
    }

    fn bearer(token: &str) -> String {
        format!("Bearer {token}")
    }

    fn denial(result: Result<impl std::fmt::Debug, GateError>) -> DenialReason {
        match result {
            Err(GateError::Denied(reason)) => reason,
            other => panic!("expected denial, got {other:?}"),
        }
    }

    #[test]
    fn bearer_parsing() {
        assert_eq!(bearer_token(Some("Bearer abc.def")), Ok("abc.def"));
        assert_eq!(bearer_token(Some("bearer  abc.def ")), Ok("abc.def"));
        assert!(bearer_token(None).is_err());
        assert!(bearer_token(Some("Basic abc")).is_err());
        assert!(bearer_token(Some("Bearer")).is_err());
        assert!(bearer_token(Some("Bearer   ")).is_err());
    }

    #[test]
    fn live_session_authenticates() {
        let db = TrustDatabase::in_memory().unwrap();
        let codecs = codecs();
        let issued = SessionIssuer::new(&db, &codecs, Duration::hours(1), Duration::hours(1))
            .issue_first_party("user-1")
            .unwrap();

        let gate = IdentityGate::new(&db, &codecs, true);
        let user = gate.authenticate(Some(&bearer(&issued.token.token))).unwrap();
        assert_eq!(user.subject_id, "user-1");
        assert_eq!(user.session_id.as_deref(), Some(issued.session.id.as_str()));
    }

    #[test]
    fn revoked_session_is_rejected_despite_valid_signature() {
        let db = TrustDatabase::in_memory().unwrap();
        let codecs = codecs();
        let issuer = SessionIssuer::new(&db, &codecs, Duration::hours(1), Duration::hours(1));
        let issued = issuer.issue_first_party("user-1").unwrap();
        let header = bearer(&issued.token.token);

        let gate = IdentityGate::new(&db, &codecs, true);
        assert!(gate.authenticate(Some(&header)).is_ok());

        issuer.revoke(SessionKind::FirstParty, &issued.session.id).unwrap();
        assert!(codecs.first_party.verify(&issued.token.token).is_ok());
        assert_eq!(denial(gate.authenticate(Some(&header))), DenialReason::SessionInvalid);
    }

    #[test]
    fn denial_reasons_follow_the_state_machine() {
        let db = TrustDatabase::in_memory().unwrap();
        let codecs = codecs();
        let gate = IdentityGate::new(&db, &codecs, true);

        assert_eq!(
            denial(gate.authenticate(None)),
            DenialReason::MissingOrInvalidAuthorizationHeader
        );
        assert_eq!(
            denial(gate.authenticate(Some("Bearer not-a-token"))),
            DenialReason::InvalidOrExpiredSessionToken
        );

        let orphan = codecs
            .first_party
            .issue(
                FirstPartyClaims {
                    sub: "user-1".to_string(),
                    sid: Some("no-such-session".to_string()),
                },
                Duration::hours(1),
            )
            .unwrap();
        assert_eq!(
            denial(gate.authenticate(Some(&bearer(&orphan.token)))),
            DenialReason::SessionNotFound
        );
    }

    #[test]
    fn subject_must_match_session() {
        let db = TrustDatabase::in_memory().unwrap();
        let codecs = codecs();
        let issued = SessionIssuer::new(&db, &codecs, Duration::hours(1), Duration::hours(1))
            .issue_first_party("user-1")
            .unwrap();

        let stolen_sid = codecs
            .first_party
            .issue(
                FirstPartyClaims {
                    sub: "user-2".to_string(),
                    sid: Some(issued.session.id.clone()),
                },
                Duration::hours(1),
            )
            .unwrap();
        let gate = IdentityGate::new(&db, &codecs, true);
        assert_eq!(
            denial(gate.authenticate(Some(&bearer(&stolen_sid.token)))),
            DenialReason::SessionInvalid
        );
    }

    #[test]
    fn unbound_mode_skips_store() {
        let db = TrustDatabase::in_memory().unwrap();
        let codecs = codecs();
        let token = codecs
            .first_party
            .issue(
                FirstPartyClaims {
                    sub: "user-1".to_string(),
                    sid: None,
                },
                Duration::hours(1),
            )
            .unwrap();

        let bound = IdentityGate::new(&db, &codecs, true);
        assert_eq!(
            denial(bound.authenticate(Some(&bearer(&token.token)))),
            DenialReason::SessionNotFound
        );

        let unbound = IdentityGate::new(&db, &codecs, false);
        assert_eq!(
            unbound.authenticate(Some(&bearer(&token.token))).unwrap().subject_id,
            "user-1"
        );
    }

    #[test]
    fn provider_tokens_use_their_own_namespace() {
        let db = TrustDatabase::in_memory().unwrap();
        let codecs = codecs();
        let issuer = SessionIssuer::new(&db, &codecs, Duration::hours(1), Duration::hours(1));
        let provider = issuer
            .issue_provider("did:hcn:ed25519:fp", &["provider:*".to_string()])
            .unwrap();
        let first = issuer.issue_first_party("user-1").unwrap();

        let gate = IdentityGate::new(&db, &codecs, true);
        let principal = gate
            .authenticate_provider(Some(&bearer(&provider.token.token)))
            .unwrap();
        assert_eq!(principal.did, "did:hcn:ed25519:fp");
        assert!(principal.has_scope("provider:anything"));

        assert_eq!(
            denial(gate.authenticate(Some(&bearer(&provider.token.token)))),
            DenialReason::InvalidOrExpiredSessionToken
        );
        assert_eq!(
            denial(gate.authenticate_provider(Some(&bearer(&first.token.token)))),
            DenialReason::InvalidOrExpiredSessionToken
        );

        issuer.revoke(SessionKind::Provider, &provider.session.id).unwrap();
        assert_eq!(
            denial(gate.authenticate_provider(Some(&bearer(&provider.token.token)))),
            DenialReason::SessionInvalid
        );
    }
}
