// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Trust Storage
//!
//! Durable state for sessions, challenges and linked identities, kept in a
//! single redb file under the data directory. Every check-then-act step
//! (challenge redemption, DID claiming, claim markers) runs inside one redb
//! write transaction.
//!
//! ## Storage Layout
//!
//! ```text
//! /data/
//!   trust.redb               # all trust tables
//!   audit/
//!     {date}/events.jsonl    # daily audit logs
//! ```
//!
//! Secrets at rest (wallet addresses) are sealed with
//! [`crate::crypto::FieldCipher`] before they reach this layer.

pub mod audit;
pub mod challenges;
pub mod claims;
pub mod credentials;
pub mod database;
pub mod identities;
pub mod paths;
pub mod sessions;

pub use audit::{
    AuditError, AuditEvent, AuditOutcome, AuditRequest, AuditSink, Auditor, FileAuditSink,
    MemoryAuditSink, TracingAuditSink,
};
pub use challenges::{ChallengeRepository, StoredProviderChallenge, StoredWalletChallenge};
pub use claims::{ClaimMarkerRepository, StoredClaimMarker};
pub use credentials::{CredentialRepository, StoredCredential};
pub use database::{RecordAction, StorageError, StorageResult, TrustDatabase};
pub use identities::{IdentityRepository, LinkOutcome, LinkedIdentity};
pub use paths::StoragePaths;
pub use sessions::{SessionKind, SessionRepository, StoredSession};
