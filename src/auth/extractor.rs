// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for authenticated callers.
//!
//! ```rust,ignore
//! async fn my_handler(Auth(user): Auth) -> impl IntoResponse {
//!     // user.subject_id is the canonical identity
//! }
//! ```
//!
//! Denials are audited with their reason before the uniform rejection is
//! returned.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use serde_json::json;

use super::{AuthError, AuthenticatedUser, ProviderPrincipal};
use crate::state::AppState;
use crate::storage::{AuditEvent, AuditOutcome};

/// Extractor for first-party callers.
pub struct Auth(pub AuthenticatedUser);

/// Extractor for callers holding a provider token.
pub struct ProviderAuth(pub ProviderPrincipal);

fn authorization(parts: &Parts) -> Option<&str> {
    parts.headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok())
}

fn audit_denial(parts: &Parts, state: &AppState, action: &str, err: &AuthError) {
    tracing::debug!(reason = err.audit_reason(), path = %parts.uri.path(), "Request denied");
    state.auditor.emit(
        AuditEvent::new("gate", action, AuditOutcome::Deny)
            .with_status(err.status_code().as_u16())
            .with_request(state.audit_request(&parts.method, &parts.uri, &parts.headers))
            .with_metadata(json!({ "reason": err.audit_reason() })),
    );
}

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>().cloned() {
            return Ok(Auth(user));
        }

        match state.gate().authenticate(authorization(parts)) {
            Ok(user) => {
                parts.extensions.insert(user.clone());
                Ok(Auth(user))
            }
            Err(e) => {
                let err = AuthError::from(e);
                audit_denial(parts, state, "authenticate", &err);
                Err(err)
            }
        }
    }
}

impl FromRequestParts<AppState> for ProviderAuth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(principal) = parts.extensions.get::<ProviderPrincipal>().cloned() {
            return Ok(ProviderAuth(principal));
        }

        match state.gate().authenticate_provider(authorization(parts)) {
            Ok(principal) => {
                parts.extensions.insert(principal.clone());
                Ok(ProviderAuth(principal))
            }
            Err(e) => {
                let err = AuthError::from(e);
                audit_denial(parts, state, "authenticate_provider", &err);
                Err(err)
            }
        }
    }
}

impl ProviderAuth {
    /// Require a scope, auditing the denial when it is missing.
    pub fn require_scope(&self, scope: &str) -> Result<(), AuthError> {
        if self.0.has_scope(scope) {
            Ok(())
        } else {
            tracing::debug!(session_id = %self.0.session_id, scope, "Provider scope missing");
            Err(AuthError::InsufficientScope)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use std::sync::Arc;

    use crate::storage::MemoryAuditSink;

    fn parts_with_auth(value: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/v1/auth/session");
        if let Some(value) = value {
            builder = builder.header(AUTHORIZATION, value);
        }
        let (parts, _) = builder.body(()).unwrap().into_parts();
        parts
    }

    #[tokio::test]
    async fn missing_header_is_denied_and_audited() {
        let sink = Arc::new(MemoryAuditSink::default());
        let state = AppState::for_tests_with_sink(sink.clone());
        let mut parts = parts_with_auth(None);

        let result = Auth::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::Unauthorized(_))));

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].outcome, AuditOutcome::Deny);
        assert_eq!(events[0].status_code, Some(401));
        assert_eq!(
            events[0].metadata.as_ref().unwrap()["reason"],
            "missing_or_invalid_authorization_header"
        );
        assert_eq!(events[0].request.path, "/v1/auth/session");
    }

    #[tokio::test]
    async fn valid_token_attaches_user() {
        let state = AppState::for_tests();
        let issued = state.issuer().issue_first_party("user-1").unwrap();
        let header = format!("Bearer {}", issued.token.token);
        let mut parts = parts_with_auth(Some(&header));

        let Auth(user) = Auth::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(user.subject_id, "user-1");
        assert_eq!(parts.extensions.get::<AuthenticatedUser>(), Some(&user));
    }

    #[tokio::test]
    async fn provider_extractor_checks_scopes() {
        let state = AppState::for_tests();
        let issued = state
            .issuer()
            .issue_provider("did:hcn:ed25519:fp", &["provider:posts:read".to_string()])
            .unwrap();
        let header = format!("Bearer {}", issued.token.token);
        let mut parts = parts_with_auth(Some(&header));

        let provider = ProviderAuth::from_request_parts(&mut parts, &state).await.unwrap();
        assert!(provider.require_scope("provider:posts:read").is_ok());
        assert!(matches!(
            provider.require_scope("provider:posts:write"),
            Err(AuthError::InsufficientScope)
        ));
    }
}
