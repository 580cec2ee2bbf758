// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::RequestMeta;
use crate::{
    audit_log,
    auth::Auth,
    error::ApiError,
    state::AppState,
    storage::{AuditEvent, AuditOutcome, SessionKind},
};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CredentialsRequest {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub subject_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignInResponse {
    pub token: String,
    pub session_id: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub subject_id: String,
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// The session the request was made with.
    pub current: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionListResponse {
    pub sessions: Vec<SessionSummary>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogoutAllResponse {
    pub revoked: usize,
}

/// Run password work (Argon2) off the async executor.
async fn with_passwords<T, F>(state: &AppState, work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&AppState) -> Result<T, ApiError> + Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || work(&state))
        .await
        .map_err(ApiError::internal)?
}

fn audit_failure(state: &AppState, meta: &RequestMeta, action: &str, err: &ApiError) {
    let outcome = if err.status.is_server_error() {
        AuditOutcome::Error
    } else {
        AuditOutcome::Deny
    };
    state.auditor.emit(
        AuditEvent::new("session", action, outcome)
            .with_status(err.status.as_u16())
            .with_request(meta.audit.clone()),
    );
}

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = CredentialsRequest,
    tag = "Auth",
    responses(
        (status = 201, body = RegisterResponse),
        (status = 400, description = "Invalid login or weak password"),
        (status = 409, description = "Login already registered")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    meta: RequestMeta,
    Json(request): Json<CredentialsRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let subject_id = with_passwords(&state, move |state| {
        Ok(state.passwords().register(&request.login, &request.password)?)
    })
    .await
    .map_err(|err| {
        audit_failure(&state, &meta, "register", &err);
        err
    })?;

    audit_log!(
        state.auditor,
        "session",
        "register",
        AuditOutcome::Success,
        meta.audit,
        actor = &subject_id
    );
    Ok((StatusCode::CREATED, Json(RegisterResponse { subject_id })))
}

#[utoipa::path(
    post,
    path = "/v1/auth/sign-in",
    request_body = CredentialsRequest,
    tag = "Auth",
    responses(
        (status = 200, body = SignInResponse),
        (status = 401, description = "Unknown login or wrong password")
    )
)]
pub async fn sign_in(
    State(state): State<AppState>,
    meta: RequestMeta,
    Json(request): Json<CredentialsRequest>,
) -> Result<Json<SignInResponse>, ApiError> {
    let issued = with_passwords(&state, move |state| {
        let subject_id = state.passwords().authenticate(&request.login, &request.password)?;
        Ok(state.issuer().issue_first_party(&subject_id)?)
    })
    .await
    .map_err(|err| {
        audit_failure(&state, &meta, "sign_in", &err);
        err
    })?;

    audit_log!(
        state.auditor,
        "session",
        "sign_in",
        AuditOutcome::Success,
        meta.audit,
        actor = &issued.session.subject_id
    );
    Ok(Json(SignInResponse {
        token: issued.token.token,
        session_id: issued.session.id,
        expires_at: issued.token.expires_at,
    }))
}

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    tag = "Auth",
    responses(
        (status = 200, body = SessionResponse),
        (status = 401, description = "Missing, invalid or revoked session")
    )
)]
pub async fn current_session(Auth(user): Auth) -> Json<SessionResponse> {
    Json(SessionResponse {
        subject_id: user.subject_id,
        session_id: user.session_id,
    })
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    tag = "Auth",
    responses(
        (status = 204, description = "Session revoked"),
        (status = 401, description = "Missing, invalid or revoked session")
    )
)]
pub async fn logout(
    Auth(user): Auth,
    State(state): State<AppState>,
    meta: RequestMeta,
) -> Result<StatusCode, ApiError> {
    if let Some(session_id) = user.session_id.as_deref() {
        state.issuer().revoke(SessionKind::FirstParty, session_id)?;
    }
    audit_log!(
        state.auditor,
        "session",
        "logout",
        AuditOutcome::Success,
        meta.audit,
        actor = &user.subject_id
    );
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/v1/auth/sessions",
    tag = "Auth",
    responses(
        (status = 200, body = SessionListResponse),
        (status = 401, description = "Missing, invalid or revoked session")
    )
)]
pub async fn list_sessions(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<SessionListResponse>, ApiError> {
    let sessions = state
        .issuer()
        .live_sessions(SessionKind::FirstParty, &user.subject_id)?
        .into_iter()
        .map(|session| SessionSummary {
            current: user.session_id.as_deref() == Some(session.id.as_str()),
            id: session.id,
            issued_at: session.issued_at,
            expires_at: session.expires_at,
        })
        .collect();
    Ok(Json(SessionListResponse { sessions }))
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout-all",
    tag = "Auth",
    responses(
        (status = 200, body = LogoutAllResponse, description = "All subject sessions revoked"),
        (status = 401, description = "Missing, invalid or revoked session")
    )
)]
pub async fn logout_all(
    Auth(user): Auth,
    State(state): State<AppState>,
    meta: RequestMeta,
) -> Result<Json<LogoutAllResponse>, ApiError> {
    let revoked = state
        .issuer()
        .revoke_all(SessionKind::FirstParty, &user.subject_id)?;
    audit_log!(
        state.auditor,
        "session",
        "logout_all",
        AuditOutcome::Success,
        meta.audit,
        actor = &user.subject_id
    );
    Ok(Json(LogoutAllResponse { revoked }))
}

#[cfg(test)]
mod tests {
    use super::super::tests::{json_body, send};
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    use crate::storage::MemoryAuditSink;

    async fn signed_in(state: &AppState) -> (String, String) {
        let creds = json!({"login": "Alice@Example.com", "password": "correct horse battery"});
        let response = send(state, "POST", "/v1/auth/register", None, Some(creds.clone())).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let subject = json_body(response).await["subjectId"].as_str().unwrap().to_string();

        let response = send(state, "POST", "/v1/auth/sign-in", None, Some(creds)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let token = json_body(response).await["token"].as_str().unwrap().to_string();
        (subject, token)
    }

    #[tokio::test]
    async fn sign_in_then_session_lookup() {
        let state = AppState::for_tests();
        let (subject, token) = signed_in(&state).await;

        let response = send(&state, "GET", "/v1/auth/session", Some(&token), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["subjectId"], subject.as_str());
        assert!(body["sessionId"].is_string());
    }

    #[tokio::test]
    async fn revoked_session_is_rejected() {
        let state = AppState::for_tests();
        let (_, token) = signed_in(&state).await;

        let response = send(&state, "POST", "/v1/auth/logout", Some(&token), None).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = send(&state, "GET", "/v1/auth/session", Some(&token), None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await, json!({"error": "unauthorized"}));
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let state = AppState::for_tests();
        signed_in(&state).await;
        let creds = json!({"login": "alice@example.com", "password": "another password"});
        let response = send(&state, "POST", "/v1/auth/register", None, Some(creds)).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn sessions_are_listed_and_revoked_everywhere() {
        let state = AppState::for_tests();
        let (_, token) = signed_in(&state).await;
        let creds = json!({"login": "alice@example.com", "password": "correct horse battery"});
        let response = send(&state, "POST", "/v1/auth/sign-in", None, Some(creds)).await;
        let second = json_body(response).await["token"].as_str().unwrap().to_string();
        let stranger = super::super::tests::first_party_token(&state, "someone-else");

        let response = send(&state, "GET", "/v1/auth/sessions", Some(&token), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let listed = json_body(response).await;
        let sessions = listed["sessions"].as_array().unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions.iter().filter(|s| s["current"] == true).count(), 1);

        let response = send(&state, "POST", "/v1/auth/logout-all", Some(&second), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({"revoked": 2}));

        for revoked in [&token, &second] {
            let response = send(&state, "GET", "/v1/auth/session", Some(revoked), None).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
        let response = send(&state, "GET", "/v1/auth/session", Some(&stranger), None).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_login_is_unauthorized() {
        let state = AppState::for_tests();
        let creds = json!({"login": "ghost@example.com", "password": "correct horse battery"});
        let response = send(&state, "POST", "/v1/auth/sign-in", None, Some(creds)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await, json!({"error": "unauthorized"}));
    }

    #[tokio::test]
    async fn wrong_password_is_audited_without_credentials() {
        let sink = Arc::new(MemoryAuditSink::default());
        let state = AppState::for_tests_with_sink(sink.clone());
        signed_in(&state).await;

        let creds = json!({"login": "alice@example.com", "password": "wrong password!"});
        let response = send(&state, "POST", "/v1/auth/sign-in", None, Some(creds)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let events = sink.events();
        let denied = events
            .iter()
            .find(|e| e.action == "sign_in" && e.outcome == AuditOutcome::Deny)
            .expect("denial recorded");
        assert_eq!(denied.status_code, Some(401));
        let serialized = serde_json::to_string(denied).unwrap();
        assert!(!serialized.contains("wrong password"));
        assert!(!serialized.contains("alice@example.com"));
    }
}
