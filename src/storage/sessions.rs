// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session store for first-party and provider sessions.
//!
//! Each [`SessionKind`] lives in its own table, so a provider session id can
//! never be looked up as a first-party session. Sessions are never deleted;
//! revocation only stamps `revoked_at`, keeping the record for audit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::database::{
    RecordAction, RecordTable, StorageError, StorageResult, TrustDatabase, FIRST_PARTY_SESSIONS,
    PROVIDER_SESSIONS,
};

/// Which namespace a session belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    FirstParty,
    Provider,
}

impl SessionKind {
    fn table(self) -> RecordTable {
        match self {
            SessionKind::FirstParty => FIRST_PARTY_SESSIONS,
            SessionKind::Provider => PROVIDER_SESSIONS,
        }
    }
}

/// Persisted session record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredSession {
    /// Unique session identifier (UUID)
    pub id: String,
    pub kind: SessionKind,
    /// Subject id for first-party sessions, DID for provider sessions
    pub subject_id: String,
    /// Granted scopes (provider sessions only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
}

impl StoredSession {
    /// Live iff never revoked and not yet expired.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }

    pub fn is_live(&self) -> bool {
        self.is_live_at(Utc::now())
    }
}

/// Repository for session records.
pub struct SessionRepository<'a> {
    db: &'a TrustDatabase,
}

impl<'a> SessionRepository<'a> {
    pub fn new(db: &'a TrustDatabase) -> Self {
        Self { db }
    }

    pub fn create(&self, session: &StoredSession) -> StorageResult<()> {
        self.db.insert_new(session.kind.table(), &session.id, session)
    }

    pub fn get_by_id(
        &self,
        kind: SessionKind,
        session_id: &str,
    ) -> StorageResult<Option<StoredSession>> {
        self.db.get(kind.table(), session_id)
    }

    /// Revoke a session.
    ///
    /// Idempotent: revoking an already revoked session keeps the original
    /// `revoked_at`. Returns `false` when no such session exists.
    pub fn revoke(&self, kind: SessionKind, session_id: &str) -> StorageResult<bool> {
        self.db.transact(kind.table(), session_id, |current: Option<StoredSession>| {
            match current {
                None => Ok::<_, StorageError>((RecordAction::Keep, false)),
                Some(session) if session.revoked_at.is_some() => Ok((RecordAction::Keep, true)),
                Some(mut session) => {
                    session.revoked_at = Some(Utc::now());
                    Ok((RecordAction::Put(session), true))
                }
            }
        })
    }

    /// Every session of a subject, revoked and expired ones included.
    pub fn list_for_subject(
        &self,
        kind: SessionKind,
        subject_id: &str,
    ) -> StorageResult<Vec<StoredSession>> {
        Ok(self
            .db
            .scan::<StoredSession>(kind.table())?
            .into_iter()
            .map(|(_, session)| session)
            .filter(|session| session.subject_id == subject_id)
            .collect())
    }

    /// Revoke every live session of a subject ("log out everywhere").
    pub fn revoke_all_for_subject(
        &self,
        kind: SessionKind,
        subject_id: &str,
    ) -> StorageResult<usize> {
        let mut revoked = 0;
        for session in self.list_for_subject(kind, subject_id)? {
            if session.revoked_at.is_none() && self.revoke(kind, &session.id)? {
                revoked += 1;
            }
        }
        Ok(revoked)
    }
}
