// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded trust database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `sessions`: session_id → first-party `StoredSession`
//! - `provider_sessions`: session_id → provider `StoredSession`
//! - `wallet_challenges`: nonce → `StoredWalletChallenge`
//! - `provider_challenges`: challenge_id → `StoredProviderChallenge`
//! - `linked_identities`: subject_id → `LinkedIdentity`
//! - `did_subjects`: did → subject_id
//! - `credentials`: login blind index → `StoredCredential`
//! - `claim_markers`: claim marker → `StoredClaimMarker`
//!
//! Every value is serialized JSON. redb serializes write transactions, so a
//! read-check-write inside [`TrustDatabase::transact`] is atomic with respect
//! to every other writer.

use std::path::Path;

use redb::{
    backends::InMemoryBackend, Database, ReadableDatabase, ReadableTable, TableDefinition,
};
use serde::{de::DeserializeOwned, Serialize};

/// Table of JSON records keyed by a string id.
pub type RecordTable = TableDefinition<'static, &'static str, &'static [u8]>;

pub const FIRST_PARTY_SESSIONS: RecordTable = TableDefinition::new("sessions");
pub const PROVIDER_SESSIONS: RecordTable = TableDefinition::new("provider_sessions");
pub const WALLET_CHALLENGES: RecordTable = TableDefinition::new("wallet_challenges");
pub const PROVIDER_CHALLENGES: RecordTable = TableDefinition::new("provider_challenges");
pub const LINKED_IDENTITIES: RecordTable = TableDefinition::new("linked_identities");
pub const DID_SUBJECTS: TableDefinition<'static, &'static str, &'static str> =
    TableDefinition::new("did_subjects");
pub const CREDENTIALS: RecordTable = TableDefinition::new("credentials");
pub const CLAIM_MARKERS: RecordTable = TableDefinition::new("claim_markers");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("redb database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("already exists: {0}")]
    AlreadyExists(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// What [`TrustDatabase::transact`] should do with the record once the
/// caller's check has passed.
#[derive(Debug)]
pub enum RecordAction<T> {
    Keep,
    Put(T),
    Remove,
}

// =============================================================================
// TrustDatabase
// =============================================================================

/// Long-lived handle to the trust database, constructed once at startup.
pub struct TrustDatabase {
    db: Database,
}

impl TrustDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// Process-local database. Contents are lost when the handle is dropped.
    pub fn in_memory() -> StorageResult<Self> {
        let db = Database::builder().create_with_backend(InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> StorageResult<Self> {
        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            for table in [
                FIRST_PARTY_SESSIONS,
                PROVIDER_SESSIONS,
                WALLET_CHALLENGES,
                PROVIDER_CHALLENGES,
                LINKED_IDENTITIES,
                CREDENTIALS,
                CLAIM_MARKERS,
            ] {
                let _ = write_txn.open_table(table)?;
            }
            let _ = write_txn.open_table(DID_SUBJECTS)?;
        }
        write_txn.commit()?;
        Ok(Self { db })
    }

    /// Raw handle for repositories that touch more than one table at once.
    pub(crate) fn raw(&self) -> &Database {
        &self.db
    }

    /// Cheap read used by the readiness endpoint.
    pub fn health_check(&self) -> StorageResult<()> {
        let read_txn = self.db.begin_read()?;
        let _ = read_txn.open_table(FIRST_PARTY_SESSIONS)?;
        Ok(())
    }

    // =========================================================================
    // Generic JSON record operations
    // =========================================================================

    pub fn get<T: DeserializeOwned>(
        &self,
        table: RecordTable,
        key: &str,
    ) -> StorageResult<Option<T>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table)?;
        let record = match table.get(key)? {
            Some(value) => Some(serde_json::from_slice(value.value())?),
            None => None,
        };
        Ok(record)
    }

    /// Insert a record that must not exist yet.
    pub fn insert_new<T: Serialize>(
        &self,
        table: RecordTable,
        key: &str,
        value: &T,
    ) -> StorageResult<()> {
        let json = serde_json::to_vec(value)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(table)?;
            if table.get(key)?.is_some() {
                drop(table);
                write_txn.abort()?;
                return Err(StorageError::AlreadyExists(key.to_string()));
            }
            table.insert(key, json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Every record of a table. Tables here stay small (per-process sessions,
    /// short-lived challenges), so a full scan is acceptable.
    pub fn scan<T: DeserializeOwned>(&self, table: RecordTable) -> StorageResult<Vec<(String, T)>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table)?;
        let mut records = Vec::new();
        for entry in table.iter()? {
            let (key, value) = entry?;
            records.push((key.value().to_string(), serde_json::from_slice(value.value())?));
        }
        Ok(records)
    }

    /// Remove every record matching `predicate`, returning how many went.
    pub fn remove_where<T: DeserializeOwned>(
        &self,
        table: RecordTable,
        predicate: impl Fn(&T) -> bool,
    ) -> StorageResult<usize> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(table)?;
            let mut doomed = Vec::new();
            for entry in table.iter()? {
                let (key, value) = entry?;
                let record: T = serde_json::from_slice(value.value())?;
                if predicate(&record) {
                    doomed.push(key.value().to_string());
                }
            }
            for key in &doomed {
                table.remove(key.as_str())?;
            }
            doomed.len()
        };
        write_txn.commit()?;
        Ok(removed)
    }

    /// Atomic read-check-write of a single record.
    ///
    /// `check` sees the current record (if any) and either fails, which aborts
    /// the transaction and leaves the record untouched, or returns the action
    /// to apply together with its result. The action is committed before this
    /// returns, so no concurrent caller can observe the record in between.
    pub fn transact<T, R, E>(
        &self,
        table: RecordTable,
        key: &str,
        check: impl FnOnce(Option<T>) -> Result<(RecordAction<T>, R), E>,
    ) -> Result<R, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<StorageError>,
    {
        let write_txn = self.db.begin_write().map_err(StorageError::from)?;
        let outcome = {
            let mut table = write_txn.open_table(table).map_err(StorageError::from)?;
            let current: Option<T> = match table.get(key).map_err(StorageError::from)? {
                Some(value) => {
                    Some(serde_json::from_slice(value.value()).map_err(StorageError::from)?)
                }
                None => None,
            };

            match check(current) {
                Ok((action, result)) => {
                    match action {
                        RecordAction::Keep => {}
                        RecordAction::Put(record) => {
                            let json = serde_json::to_vec(&record).map_err(StorageError::from)?;
                            table.insert(key, json.as_slice()).map_err(StorageError::from)?;
                        }
                        RecordAction::Remove => {
                            table.remove(key).map_err(StorageError::from)?;
                        }
                    }
                    Ok(result)
                }
                Err(e) => Err(e),
            }
        };

        match outcome {
            Ok(result) => {
                write_txn.commit().map_err(StorageError::from)?;
                Ok(result)
            }
            Err(e) => {
                if let Err(abort_err) = write_txn.abort() {
                    tracing::warn!(
                        error = %abort_err,
                        "Failed to abort trust database transaction"
                    );
                }
                Err(e)
            }
        }
    }
}
