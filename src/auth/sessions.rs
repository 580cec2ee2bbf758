// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Minting and revoking sessions.
//!
//! Every token handed out here references a session record, so revoking the
//! record invalidates the token on its next use even though its signature
//! stays valid until `exp`.

use chrono::{Duration, Utc};
use uuid::Uuid;

use super::token::{FirstPartyClaims, IssuedToken, ProviderClaims, TokenCodecs, TokenError};
use crate::identity::scopes::filter_scopes;
use crate::storage::{SessionKind, SessionRepository, StorageError, StoredSession, TrustDatabase};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Token(#[from] TokenError),
}

/// A session record together with the token that references it.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub session: StoredSession,
    pub token: IssuedToken,
}

pub struct SessionIssuer<'a> {
    db: &'a TrustDatabase,
    codecs: &'a TokenCodecs,
    session_ttl: Duration,
    provider_ttl: Duration,
}

impl<'a> SessionIssuer<'a> {
    pub fn new(
        db: &'a TrustDatabase,
        codecs: &'a TokenCodecs,
        session_ttl: Duration,
        provider_ttl: Duration,
    ) -> Self {
        Self {
            db,
            codecs,
            session_ttl,
            provider_ttl,
        }
    }

    /// Sign-in: first-party session plus bearer token.
    pub fn issue_first_party(&self, subject_id: &str) -> Result<IssuedSession, SessionError> {
        let now = Utc::now();
        let session_id = Uuid::new_v4().to_string();

        let token = self.codecs.first_party.issue_at(
            FirstPartyClaims {
                sub: subject_id.to_string(),
                sid: Some(session_id.clone()),
            },
            self.session_ttl,
            now,
        )?;

        let session = StoredSession {
            id: session_id,
            kind: SessionKind::FirstParty,
            subject_id: subject_id.to_string(),
            scopes: Vec::new(),
            issued_at: token.issued_at,
            expires_at: token.expires_at,
            revoked_at: None,
        };
        SessionRepository::new(self.db).create(&session)?;

        tracing::info!(session_id = %session.id, subject_id, "First-party session issued");
        Ok(IssuedSession { session, token })
    }

    /// Provider session for a DID. Requested scopes are filtered first.
    pub fn issue_provider(
        &self,
        did: &str,
        requested_scopes: &[String],
    ) -> Result<IssuedSession, SessionError> {
        let now = Utc::now();
        let session_id = Uuid::new_v4().to_string();
        let scopes = filter_scopes(requested_scopes);

        let token = self.codecs.provider.issue_at(
            ProviderClaims {
                sid: session_id.clone(),
                did: did.to_string(),
                scopes: scopes.clone(),
            },
            self.provider_ttl,
            now,
        )?;

        let session = StoredSession {
            id: session_id,
            kind: SessionKind::Provider,
            subject_id: did.to_string(),
            scopes,
            issued_at: token.issued_at,
            expires_at: token.expires_at,
            revoked_at: None,
        };
        SessionRepository::new(self.db).create(&session)?;

        tracing::info!(
            session_id = %session.id,
            did,
            scopes = ?session.scopes,
            "Provider session issued"
        );
        Ok(IssuedSession { session, token })
    }

    /// Idempotent. Returns `false` if the session does not exist.
    pub fn revoke(&self, kind: SessionKind, session_id: &str) -> Result<bool, SessionError> {
        let revoked = SessionRepository::new(self.db).revoke(kind, session_id)?;
        if revoked {
            tracing::info!(session_id, ?kind, "Session revoked");
        }
        Ok(revoked)
    }

    /// Live sessions of `subject_id`, oldest first.
    pub fn live_sessions(
        &self,
        kind: SessionKind,
        subject_id: &str,
    ) -> Result<Vec<StoredSession>, SessionError> {
        let now = Utc::now();
        let mut sessions: Vec<_> = SessionRepository::new(self.db)
            .list_for_subject(kind, subject_id)?
            .into_iter()
            .filter(|session| session.is_live_at(now))
            .collect();
        sessions.sort_by_key(|session| session.issued_at);
        Ok(sessions)
    }

    /// Revoke every session of `subject_id`. Returns how many were live.
    pub fn revoke_all(&self, kind: SessionKind, subject_id: &str) -> Result<usize, SessionError> {
        let revoked = SessionRepository::new(self.db).revoke_all_for_subject(kind, subject_id)?;
        tracing::info!(subject_id, ?kind, revoked, "All sessions revoked");
        Ok(revoked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::scopes::DEFAULT_SCOPE;

    fn codecs() -> TokenCodecs {
        TokenCodecs::from_secrets(
            b"token-secret-0123456789abcdef0123456789",
            b"wallet-secret-0123456789abcdef012345678",
        )
    }

    #[test]
    fn first_party_token_references_session() {
        let db = TrustDatabase::in_memory().unwrap();
        let codecs = codecs();
        let issuer = SessionIssuer::new(&db, &codecs, Duration::hours(1), Duration::minutes(10));

        let issued = issuer.issue_first_party("user-1").unwrap();
        let claims = codecs.first_party.verify(&issued.token.token).unwrap().claims;
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.sid.as_deref(), Some(issued.session.id.as_str()));

        let stored = SessionRepository::new(&db)
            .get_by_id(SessionKind::FirstParty, &issued.session.id)
            .unwrap()
            .unwrap();
        assert!(stored.is_live());
        assert_eq!(stored.expires_at, issued.token.expires_at);
    }

    #[test]
    fn provider_scopes_are_filtered() {
        let db = TrustDatabase::in_memory().unwrap();
        let codecs = codecs();
        let issuer = SessionIssuer::new(&db, &codecs, Duration::hours(1), Duration::minutes(10));

        let issued = issuer
            .issue_provider("did:hcn:ed25519:fp", &["bogus".to_string()])
            .unwrap();
        assert_eq!(issued.session.scopes, vec![DEFAULT_SCOPE.to_string()]);
        assert!(SessionRepository::new(&db)
            .get_by_id(SessionKind::FirstParty, &issued.session.id)
            .unwrap()
            .is_none());
    }

    #[test]
    fn revoke_is_idempotent() {
        let db = TrustDatabase::in_memory().unwrap();
        let codecs = codecs();
        let issuer = SessionIssuer::new(&db, &codecs, Duration::hours(1), Duration::minutes(10));

        let issued = issuer.issue_first_party("user-1").unwrap();
        assert!(issuer.revoke(SessionKind::FirstParty, &issued.session.id).unwrap());
        assert!(issuer.revoke(SessionKind::FirstParty, &issued.session.id).unwrap());
        assert!(!issuer.revoke(SessionKind::FirstParty, "missing").unwrap());
    }

    #[test]
    fn revoke_all_only_touches_one_subject() {
        let db = TrustDatabase::in_memory().unwrap();
        let codecs = codecs();
        let issuer = SessionIssuer::new(&db, &codecs, Duration::hours(1), Duration::minutes(10));

        let first = issuer.issue_first_party("user-1").unwrap();
        issuer.issue_first_party("user-1").unwrap();
        let other = issuer.issue_first_party("user-2").unwrap();
        issuer.revoke(SessionKind::FirstParty, &first.session.id).unwrap();

        assert_eq!(issuer.live_sessions(SessionKind::FirstParty, "user-1").unwrap().len(), 1);
        assert_eq!(issuer.revoke_all(SessionKind::FirstParty, "user-1").unwrap(), 1);
        assert!(issuer.live_sessions(SessionKind::FirstParty, "user-1").unwrap().is_empty());

        let remaining = issuer.live_sessions(SessionKind::FirstParty, "user-2").unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, other.session.id);
    }
}
