// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, Json};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_cookies::{
    cookie::{time, SameSite},
    Cookie, Cookies,
};
use utoipa::ToSchema;

use super::RequestMeta;
use crate::{
    auth::Auth,
    error::ApiError,
    identity::{WalletLink, WalletProof},
    state::AppState,
    storage::{AuditEvent, AuditOutcome},
};

/// Cookie carrying the wallet session token.
pub const WALLET_SESSION_COOKIE: &str = "hcn_wallet_session";

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WalletChallengeRequest {
    pub address: String,
    pub chain_id: u64,
    pub did: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WalletChallengeResponse {
    /// Statement the wallet must sign verbatim.
    pub message: String,
    pub nonce: String,
    pub request_id: String,
    pub did: String,
    pub chain_id: u64,
    pub address: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WalletVerifyRequest {
    pub message: String,
    /// 65-byte EIP-191 signature, 0x-prefixed hex.
    pub signature: String,
    pub address: String,
    pub chain_id: u64,
    pub did: Option<String>,
    pub request_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WalletSessionView {
    pub did: String,
    pub address: String,
    pub chain_id: u64,
    pub verified_at: DateTime<Utc>,
    pub session_expires_at: DateTime<Utc>,
    pub provider_token: String,
    pub provider_token_expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WalletVerifyResponse {
    pub session: WalletSessionView,
    pub session_token: String,
}

impl From<WalletLink> for WalletVerifyResponse {
    fn from(link: WalletLink) -> Self {
        Self {
            session: WalletSessionView {
                did: link.did,
                address: link.address,
                chain_id: link.chain_id,
                verified_at: link.verified_at,
                session_expires_at: link.wallet_session.expires_at,
                provider_token: link.provider.token.token,
                provider_token_expires_at: link.provider.token.expires_at,
            },
            session_token: link.wallet_session.token,
        }
    }
}

/// `Secure` and `SameSite=None` only when the request came in over HTTPS.
fn session_cookie(token: String, ttl: Duration, https: bool) -> Cookie<'static> {
    Cookie::build((WALLET_SESSION_COOKIE, token))
        .http_only(true)
        .secure(https)
        .same_site(if https { SameSite::None } else { SameSite::Lax })
        .path("/")
        .max_age(time::Duration::seconds(ttl.num_seconds()))
        .build()
}

fn audit_wallet(
    state: &AppState,
    meta: &RequestMeta,
    action: &str,
    subject_id: &str,
    result: Result<&str, &ApiError>,
) {
    let event = match result {
        Ok(did) => AuditEvent::new("wallet", action, AuditOutcome::Success)
            .with_target(did)
            .with_status(200),
        Err(err) => AuditEvent::new(
            "wallet",
            action,
            if err.status.is_server_error() {
                AuditOutcome::Error
            } else {
                AuditOutcome::Deny
            },
        )
        .with_status(err.status.as_u16())
        .with_metadata(json!({ "reason": err.message })),
    };
    state
        .auditor
        .emit(event.with_actor(subject_id).with_request(meta.audit.clone()));
}

#[utoipa::path(
    post,
    path = "/v1/identity/wallet/challenge",
    request_body = WalletChallengeRequest,
    tag = "Wallet",
    responses(
        (status = 200, body = WalletChallengeResponse),
        (status = 400, description = "Malformed address, chain or DID"),
        (status = 401, description = "Not signed in"),
        (status = 409, description = "DID already linked to another subject")
    )
)]
pub async fn create_challenge(
    Auth(user): Auth,
    State(state): State<AppState>,
    meta: RequestMeta,
    Json(request): Json<WalletChallengeRequest>,
) -> Result<Json<WalletChallengeResponse>, ApiError> {
    let challenge = state
        .wallet_linker()
        .create_challenge(
            &user.subject_id,
            &request.address,
            request.chain_id,
            request.did.as_deref(),
        )
        .map_err(|e| {
            let err = ApiError::from(e);
            audit_wallet(&state, &meta, "challenge", &user.subject_id, Err(&err));
            err
        })?;

    audit_wallet(&state, &meta, "challenge", &user.subject_id, Ok(challenge.did.as_str()));
    Ok(Json(WalletChallengeResponse {
        message: challenge.message,
        nonce: challenge.nonce,
        request_id: challenge.request_id,
        did: challenge.did,
        chain_id: challenge.chain_id,
        address: challenge.address,
        issued_at: challenge.issued_at,
        expires_at: challenge.expires_at,
    }))
}

#[utoipa::path(
    post,
    path = "/v1/identity/wallet/verify",
    request_body = WalletVerifyRequest,
    tag = "Wallet",
    responses(
        (
            status = 200,
            body = WalletVerifyResponse,
            description = "Linked; sets the hcn_wallet_session cookie"
        ),
        (status = 400, description = "Malformed input or statement mismatch"),
        (status = 401, description = "Signature does not recover to the address"),
        (status = 403, description = "Challenge belongs to another subject"),
        (status = 404, description = "Challenge unknown, expired or already used"),
        (status = 409, description = "DID already linked to another subject")
    )
)]
pub async fn verify(
    Auth(user): Auth,
    State(state): State<AppState>,
    meta: RequestMeta,
    cookies: Cookies,
    Json(request): Json<WalletVerifyRequest>,
) -> Result<Json<WalletVerifyResponse>, ApiError> {
    let proof = WalletProof {
        message: &request.message,
        signature: &request.signature,
        address: &request.address,
        chain_id: request.chain_id,
        did: request.did.as_deref(),
        request_id: request.request_id.as_deref(),
    };
    let link = state
        .wallet_linker()
        .verify(&user.subject_id, &proof)
        .map_err(|e| {
            let err = ApiError::from(e);
            audit_wallet(&state, &meta, "verify", &user.subject_id, Err(&err));
            err
        })?;

    audit_wallet(&state, &meta, "verify", &user.subject_id, Ok(link.did.as_str()));
    cookies.add(session_cookie(
        link.wallet_session.token.clone(),
        state.config.provider_session_ttl,
        meta.https,
    ));
    Ok(Json(link.into()))
}

#[cfg(test)]
mod tests {
    use super::super::tests::{first_party_token, json_body, send};
    use super::*;
    use alloy::signers::{local::PrivateKeySigner, SignerSync};
    use axum::http::{header::SET_COOKIE, StatusCode};
    use std::sync::Arc;

    use crate::storage::MemoryAuditSink;

    const CHALLENGE: &str = "/v1/identity/wallet/challenge";
    const VERIFY: &str = "/v1/identity/wallet/verify";
    const WALLET_KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn sign(signer: &PrivateKeySigner, message: &str) -> String {
        let signature = signer.sign_message_sync(message.as_bytes()).unwrap();
        format!("0x{}", alloy::hex::encode(signature.as_bytes()))
    }

    #[tokio::test]
    async fn link_sets_cookie_and_replay_fails() {
        let sink = Arc::new(MemoryAuditSink::default());
        let state = AppState::for_tests_with_sink(sink.clone());
        let token = first_party_token(&state, "subject-1");
        let signer: PrivateKeySigner = WALLET_KEY.parse().unwrap();
        let address = signer.address().to_string();

        let body = json!({"address": address, "chainId": 1});
        let response = send(&state, "POST", CHALLENGE, Some(&token), Some(body)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let challenge = json_body(response).await;
        let message = challenge["message"].as_str().unwrap();

        let verify_body = json!({
            "message": message,
            "signature": sign(&signer, message),
            "address": address,
            "chainId": 1,
            "requestId": challenge["requestId"],
        });
        let response = send(&state, "POST", VERIFY, Some(&token), Some(verify_body.clone())).await;
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response.headers()[SET_COOKIE].to_str().unwrap().to_string();
        assert!(cookie.starts_with("hcn_wallet_session="));
        assert!(cookie.contains("HttpOnly"));

        let linked = json_body(response).await;
        assert_eq!(linked["session"]["did"], challenge["did"]);
        assert!(linked["sessionToken"].is_string());
        assert!(linked["session"]["providerToken"].is_string());

        let replay = send(&state, "POST", VERIFY, Some(&token), Some(verify_body)).await;
        assert_eq!(replay.status(), StatusCode::NOT_FOUND);

        let verifies: Vec<_> = sink.events().into_iter().filter(|e| e.action == "verify").collect();
        assert_eq!(verifies.len(), 2);
        assert_eq!(verifies[0].outcome, AuditOutcome::Success);
        assert_eq!(verifies[1].outcome, AuditOutcome::Deny);
    }

    #[tokio::test]
    async fn challenge_requires_first_party_session() {
        let state = AppState::for_tests();
        let body = json!({"address": "0x0000000000000000000000000000000000000001", "chainId": 1});
        let response = send(&state, "POST", CHALLENGE, None, Some(body)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn malformed_address_is_rejected() {
        let state = AppState::for_tests();
        let token = first_party_token(&state, "subject-1");
        let body = json!({"address": "not-an-address", "chainId": 1});
        let response = send(&state, "POST", CHALLENGE, Some(&token), Some(body)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn cookie_attributes_follow_transport() {
        let secure = session_cookie("t".to_string(), Duration::seconds(3600), true);
        assert_eq!(secure.http_only(), Some(true));
        assert_eq!(secure.secure(), Some(true));
        assert_eq!(secure.same_site(), Some(SameSite::None));
        assert_eq!(secure.path(), Some("/"));
        assert_eq!(secure.max_age(), Some(time::Duration::seconds(3600)));

        let plain = session_cookie("t".to_string(), Duration::seconds(3600), false);
        assert_eq!(plain.secure(), Some(false));
        assert_eq!(plain.same_site(), Some(SameSite::Lax));
    }
}
