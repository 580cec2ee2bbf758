// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Idempotency markers for reward claims.
//!
//! One marker per `subject:activityType:proofId`. This is a guard against
//! double signing, not a ledger of redemptions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::database::{
    RecordAction, StorageError, StorageResult, TrustDatabase, CLAIM_MARKERS,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredClaimMarker {
    pub marker: String,
    /// 0x-prefixed keccak256 of the marker
    pub claim_id: String,
    pub subject_id: String,
    pub claimed_at: DateTime<Utc>,
}

pub struct ClaimMarkerRepository<'a> {
    db: &'a TrustDatabase,
}

impl<'a> ClaimMarkerRepository<'a> {
    pub fn new(db: &'a TrustDatabase) -> Self {
        Self { db }
    }

    /// Record a marker. Returns `false` if it was already present.
    pub fn mark_once(&self, marker: &StoredClaimMarker) -> StorageResult<bool> {
        match self.db.insert_new(CLAIM_MARKERS, &marker.marker, marker) {
            Ok(()) => Ok(true),
            Err(StorageError::AlreadyExists(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Undo a marker whose signature could not be produced.
    pub fn release(&self, marker: &str) -> StorageResult<()> {
        self.db.transact(CLAIM_MARKERS, marker, |_: Option<StoredClaimMarker>| {
            Ok::<_, StorageError>((RecordAction::Remove, ()))
        })
    }

    pub fn get(&self, marker: &str) -> StorageResult<Option<StoredClaimMarker>> {
        self.db.get(CLAIM_MARKERS, marker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker(value: &str) -> StoredClaimMarker {
        StoredClaimMarker {
            marker: value.to_string(),
            claim_id: "0x00".to_string(),
            subject_id: "user-1".to_string(),
            claimed_at: Utc::now(),
        }
    }

    #[test]
    fn marker_is_accepted_once() {
        let db = TrustDatabase::in_memory().unwrap();
        let repo = ClaimMarkerRepository::new(&db);

        assert!(repo.mark_once(&marker("user-1:post:p1")).unwrap());
        assert!(!repo.mark_once(&marker("user-1:post:p1")).unwrap());
        assert!(repo.mark_once(&marker("user-1:post:p2")).unwrap());
    }

    #[test]
    fn released_marker_can_be_reused() {
        let db = TrustDatabase::in_memory().unwrap();
        let repo = ClaimMarkerRepository::new(&db);

        repo.mark_once(&marker("user-1:post:p1")).unwrap();
        repo.release("user-1:post:p1").unwrap();
        assert!(repo.get("user-1:post:p1").unwrap().is_none());
        assert!(repo.mark_once(&marker("user-1:post:p1")).unwrap());
    }
}
