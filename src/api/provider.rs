// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use super::RequestMeta;
use crate::{
    auth::{IssuedSession, ProviderAuth},
    error::ApiError,
    identity::{scopes::DEFAULT_SCOPE, ProviderProof, PROVIDER_ALGORITHM},
    state::AppState,
    storage::{AuditEvent, AuditOutcome, SessionKind},
};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProviderChallengeRequest {
    /// `did:hcn:ed25519:<fingerprint>`
    pub did: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProviderChallengeResponse {
    pub did: String,
    pub challenge_id: String,
    /// Exact bytes the provider signs with its Ed25519 key.
    pub statement: String,
    pub expires_at: DateTime<Utc>,
    pub algorithm: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProviderVerifyRequest {
    pub challenge_id: String,
    pub did: String,
    /// 32-byte public key, base64url or hex.
    pub public_key: String,
    /// 64-byte signature, base64url or hex.
    pub signature: String,
    #[serde(default)]
    pub scopes: Option<Vec<String>>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSessionView {
    pub id: String,
    pub did: String,
    pub scopes: Vec<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProviderVerifyResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub session: ProviderSessionView,
}

impl From<IssuedSession> for ProviderVerifyResponse {
    fn from(issued: IssuedSession) -> Self {
        Self {
            token: issued.token.token,
            expires_at: issued.token.expires_at,
            session: ProviderSessionView {
                id: issued.session.id,
                did: issued.session.subject_id,
                scopes: issued.session.scopes,
                issued_at: issued.session.issued_at,
                expires_at: issued.session.expires_at,
            },
        }
    }
}

fn audit_denied(state: &AppState, meta: &RequestMeta, action: &str, did: &str, err: &ApiError) {
    let outcome = if err.status.is_server_error() {
        AuditOutcome::Error
    } else {
        AuditOutcome::Deny
    };
    state.auditor.emit(
        AuditEvent::new("provider", action, outcome)
            .with_target(did)
            .with_status(err.status.as_u16())
            .with_request(meta.audit.clone())
            .with_metadata(json!({ "reason": err.message })),
    );
}

#[utoipa::path(
    post,
    path = "/v1/identity/provider/challenge",
    request_body = ProviderChallengeRequest,
    tag = "Provider",
    responses(
        (status = 200, body = ProviderChallengeResponse),
        (status = 400, description = "Malformed DID")
    )
)]
pub async fn create_challenge(
    State(state): State<AppState>,
    meta: RequestMeta,
    Json(request): Json<ProviderChallengeRequest>,
) -> Result<Json<ProviderChallengeResponse>, ApiError> {
    let challenge = state
        .provider_linker()
        .create_challenge(&request.did)
        .map_err(|e| {
            let err = ApiError::from(e);
            audit_denied(&state, &meta, "challenge", &request.did, &err);
            err
        })?;

    Ok(Json(ProviderChallengeResponse {
        did: challenge.did,
        challenge_id: challenge.id,
        statement: challenge.statement,
        expires_at: challenge.expires_at,
        algorithm: PROVIDER_ALGORITHM.to_string(),
    }))
}

#[utoipa::path(
    post,
    path = "/v1/identity/provider/verify",
    request_body = ProviderVerifyRequest,
    tag = "Provider",
    responses(
        (status = 200, body = ProviderVerifyResponse),
        (status = 400, description = "Malformed key or signature encoding"),
        (status = 401, description = "Signature verification failed"),
        (status = 403, description = "DID or key does not match the challenge"),
        (status = 404, description = "Unknown challenge"),
        (status = 409, description = "Challenge already used"),
        (status = 410, description = "Challenge expired")
    )
)]
pub async fn verify(
    State(state): State<AppState>,
    meta: RequestMeta,
    Json(request): Json<ProviderVerifyRequest>,
) -> Result<Json<ProviderVerifyResponse>, ApiError> {
    let scopes = request.scopes.unwrap_or_default();
    let proof = ProviderProof {
        challenge_id: &request.challenge_id,
        did: &request.did,
        public_key: &request.public_key,
        signature: &request.signature,
        scopes: &scopes,
    };
    let issued = state.provider_linker().verify(&proof).map_err(|e| {
        let err = ApiError::from(e);
        audit_denied(&state, &meta, "verify", &request.did, &err);
        err
    })?;

    state.auditor.emit(
        AuditEvent::new("provider", "verify", AuditOutcome::Success)
            .with_target(&issued.session.subject_id)
            .with_status(200)
            .with_request(meta.audit)
            .with_metadata(json!({
                "sessionId": issued.session.id,
                "scopes": issued.session.scopes,
            })),
    );
    Ok(Json(issued.into()))
}

#[utoipa::path(
    post,
    path = "/v1/identity/provider/revoke",
    tag = "Provider",
    responses(
        (status = 204, description = "Provider session revoked"),
        (status = 401, description = "Missing, invalid or revoked provider token"),
        (status = 403, description = "Token lacks the provider:session scope")
    )
)]
pub async fn revoke(
    provider: ProviderAuth,
    State(state): State<AppState>,
    meta: RequestMeta,
) -> Result<StatusCode, ApiError> {
    provider.require_scope(DEFAULT_SCOPE)?;
    let principal = provider.0;
    state.issuer().revoke(SessionKind::Provider, &principal.session_id)?;
    state.auditor.emit(
        AuditEvent::new("provider", "revoke", AuditOutcome::Success)
            .with_target(&principal.did)
            .with_status(204)
            .with_request(meta.audit),
    );
    Ok(StatusCode::NO_CONTENT)
}
