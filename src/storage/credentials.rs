// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Password credentials for first-party sign-in.
//!
//! Records are keyed by a blind index of the login (see
//! `auth::password::login_index`), so the raw login never reaches storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::database::{StorageResult, TrustDatabase, CREDENTIALS};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredCredential {
    pub subject_id: String,
    pub login_index: String,
    /// Argon2id PHC string
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

pub struct CredentialRepository<'a> {
    db: &'a TrustDatabase,
}

impl<'a> CredentialRepository<'a> {
    pub fn new(db: &'a TrustDatabase) -> Self {
        Self { db }
    }

    /// Fails with `AlreadyExists` if the login is taken.
    pub fn create(&self, credential: &StoredCredential) -> StorageResult<()> {
        self.db.insert_new(CREDENTIALS, &credential.login_index, credential)
    }

    pub fn get(&self, login_index: &str) -> StorageResult<Option<StoredCredential>> {
        self.db.get(CREDENTIALS, login_index)
    }
}
