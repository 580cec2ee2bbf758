// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Linked wallet identities.
//!
//! Binds a canonical `did:pkh` identifier to a subject. The wallet address is
//! stored as an encrypted field envelope; the DID index guarantees that one
//! wallet DID belongs to at most one subject.

use chrono::{DateTime, Utc};
use redb::ReadableTable;
use serde::{Deserialize, Serialize};

use super::database::{StorageResult, TrustDatabase, DID_SUBJECTS, LINKED_IDENTITIES};

/// A subject's linked wallet identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinkedIdentity {
    pub subject_id: String,
    /// Canonical `did:pkh:eip155:<chain>:<address>`
    pub did: String,
    pub chain_id: u64,
    /// Envelope-encrypted wallet address (field `wallet_address`)
    pub wallet_address: String,
    pub linked_at: DateTime<Utc>,
}

/// Result of a link attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    /// Newly linked, or re-linked by the same subject.
    Linked,
    /// The DID already belongs to another subject.
    ClaimedByOther,
}

/// Repository for linked identities.
pub struct IdentityRepository<'a> {
    db: &'a TrustDatabase,
}

impl<'a> IdentityRepository<'a> {
    pub fn new(db: &'a TrustDatabase) -> Self {
        Self { db }
    }

    pub fn get(&self, subject_id: &str) -> StorageResult<Option<LinkedIdentity>> {
        self.db.get(LINKED_IDENTITIES, subject_id)
    }

    pub fn subject_for_did(&self, did: &str) -> StorageResult<Option<String>> {
        use redb::ReadableDatabase;

        let read_txn = self.db.raw().begin_read()?;
        let table = read_txn.open_table(DID_SUBJECTS)?;
        let subject = table.get(did)?.map(|v| v.value().to_string());
        Ok(subject)
    }

    /// Bind `identity.did` to `identity.subject_id`.
    ///
    /// A subject re-linking replaces its previous wallet and frees the old DID.
    pub fn link(&self, identity: &LinkedIdentity) -> StorageResult<LinkOutcome> {
        let json = serde_json::to_vec(identity)?;
        let write_txn = self.db.raw().begin_write()?;
        {
            let mut dids = write_txn.open_table(DID_SUBJECTS)?;
            let owner = dids.get(identity.did.as_str())?.map(|v| v.value().to_string());
            if owner.as_deref().is_some_and(|owner| owner != identity.subject_id) {
                drop(dids);
                write_txn.abort()?;
                return Ok(LinkOutcome::ClaimedByOther);
            }

            let mut identities = write_txn.open_table(LINKED_IDENTITIES)?;
            let previous = identities
                .insert(identity.subject_id.as_str(), json.as_slice())?
                .map(|v| v.value().to_vec());
            if let Some(previous) = previous {
                let previous: LinkedIdentity = serde_json::from_slice(&previous)?;
                if previous.did != identity.did {
                    dids.remove(previous.did.as_str())?;
                }
            }
            dids.insert(identity.did.as_str(), identity.subject_id.as_str())?;
        }
        write_txn.commit()?;
        Ok(LinkOutcome::Linked)
    }
}
