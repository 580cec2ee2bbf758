// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Verified principals attached to requests by the identity gate.

use serde::Serialize;
use utoipa::ToSchema;

use crate::identity::scopes;

/// Canonical identity of a first-party caller.
///
/// Downstream handlers trust `subject_id` without further checks.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedUser {
    pub subject_id: String,
    /// Session backing the token. Absent only when session binding is off.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Caller holding a live provider session.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderPrincipal {
    pub session_id: String,
    pub did: String,
    pub scopes: Vec<String>,
}

impl ProviderPrincipal {
    pub fn has_scope(&self, required: &str) -> bool {
        scopes::grants(&self.scopes, required)
    }
}
