// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::convert::Infallible;

use axum::{
    extract::FromRequestParts,
    http::{header::HeaderName, request::Parts},
    routing::{get, post},
    Router,
};
use tower_cookies::CookieManagerLayer;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{state::AppState, storage::AuditRequest};

pub mod auth;
pub mod health;
pub mod provider;
pub mod rewards;
pub mod wallet;

const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/sign-in", post(auth::sign_in))
        .route("/auth/session", get(auth::current_session))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/logout-all", post(auth::logout_all))
        .route("/auth/sessions", get(auth::list_sessions))
        .route("/identity/wallet/challenge", post(wallet::create_challenge))
        .route("/identity/wallet/verify", post(wallet::verify))
        .route(
            "/identity/provider/challenge",
            post(provider::create_challenge),
        )
        .route("/identity/provider/verify", post(provider::verify))
        .route("/identity/provider/revoke", post(provider::revoke))
        .route("/rewards/claims", post(rewards::create_claim));

    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    Router::new()
        .route("/health", get(health::health))
        .nest("/v1", v1_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(CookieManagerLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

/// Per-request attributes every handler needs for auditing and cookies.
pub struct RequestMeta {
    pub audit: AuditRequest,
    /// Request arrived over HTTPS (directly or behind a TLS proxy).
    pub https: bool,
}

impl FromRequestParts<AppState> for RequestMeta {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let forwarded_https = parts
            .headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|proto| proto.trim().eq_ignore_ascii_case("https"));
        let https = forwarded_https || parts.uri.scheme_str() == Some("https");

        Ok(Self {
            audit: state.audit_request(&parts.method, &parts.uri, &parts.headers),
            https,
        })
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::register,
        auth::sign_in,
        auth::current_session,
        auth::logout,
        auth::logout_all,
        auth::list_sessions,
        wallet::create_challenge,
        wallet::verify,
        provider::create_challenge,
        provider::verify,
        provider::revoke,
        rewards::create_claim
    ),
    components(
        schemas(
            health::HealthResponse,
            auth::CredentialsRequest,
            auth::RegisterResponse,
            auth::SignInResponse,
            auth::SessionResponse,
            auth::SessionSummary,
            auth::SessionListResponse,
            auth::LogoutAllResponse,
            wallet::WalletChallengeRequest,
            wallet::WalletChallengeResponse,
            wallet::WalletVerifyRequest,
            wallet::WalletVerifyResponse,
            wallet::WalletSessionView,
            provider::ProviderChallengeRequest,
            provider::ProviderChallengeResponse,
            provider::ProviderVerifyRequest,
            provider::ProviderVerifyResponse,
            provider::ProviderSessionView,
            rewards::ClaimRequest,
            rewards::ClaimResponse
        )
    ),
    tags(
        (name = "Health", description = "Liveness and storage readiness"),
        (name = "Auth", description = "Password credentials and first-party sessions"),
        (name = "Wallet", description = "Wallet linking via signed challenges"),
        (name = "Provider", description = "Detached-key provider sessions"),
        (name = "Rewards", description = "Oracle-signed reward claims")
    )
)]
struct ApiDoc;
