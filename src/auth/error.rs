// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Rejections produced by the authentication extractors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use super::gate::{DenialReason, GateError};

/// Authentication error type.
///
/// Every gate denial renders as the same `401 {"error":"unauthorized"}`.
/// The reason is kept for audit and logs only.
#[derive(Debug)]
pub enum AuthError {
    /// Token, session or header check failed
    Unauthorized(DenialReason),
    /// Provider session lacks a required scope
    InsufficientScope,
    /// Session store could not be read
    StoreUnavailable,
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: &'static str,
}

impl AuthError {
    /// Error code rendered to the caller.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::Unauthorized(_) => "unauthorized",
            AuthError::InsufficientScope => "insufficient_scope",
            AuthError::StoreUnavailable => "store_unavailable",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AuthError::InsufficientScope => StatusCode::FORBIDDEN,
            AuthError::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Reason recorded in the audit trail.
    pub fn audit_reason(&self) -> &'static str {
        match self {
            AuthError::Unauthorized(reason) => reason.as_str(),
            AuthError::InsufficientScope => DenialReason::InsufficientScope.as_str(),
            AuthError::StoreUnavailable => "store_unavailable",
        }
    }
}

impl From<GateError> for AuthError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::Denied(reason) => AuthError::Unauthorized(reason),
            GateError::StoreUnavailable(e) => {
                tracing::error!(error = %e, "Session store unavailable during authentication");
                AuthError::StoreUnavailable
            }
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.audit_reason())
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.error_code(),
        });
        (status, body).into_response()
    }
}
