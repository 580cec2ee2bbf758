// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::auth::{AuthError, PasswordError, SessionError};
use crate::identity::{ProviderLinkError, WalletLinkError};
use crate::rewards::RewardError;
use crate::storage::StorageError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized")
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn gone(message: impl Into<String>) -> Self {
        Self::new(StatusCode::GONE, message)
    }

    pub fn service_unavailable() -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable")
    }

    /// Internal failure. The detail is logged, never returned.
    pub fn internal(detail: impl std::fmt::Display) -> Self {
        tracing::error!(error = %detail, "Internal error");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        tracing::error!(error = %err, "Storage failure");
        ApiError::service_unavailable()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::new(err.status_code(), err.error_code())
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Storage(e) => e.into(),
            SessionError::Token(e) => ApiError::internal(e),
        }
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::InvalidLogin | PasswordError::WeakPassword => {
                ApiError::bad_request(err.to_string())
            }
            PasswordError::LoginTaken => ApiError::conflict(err.to_string()),
            PasswordError::InvalidCredentials => ApiError::unauthorized(),
            PasswordError::Hashing(_) => ApiError::internal(err),
            PasswordError::Storage(e) => e.into(),
        }
    }
}

impl From<WalletLinkError> for ApiError {
    fn from(err: WalletLinkError) -> Self {
        use WalletLinkError as E;
        match err {
            E::Malformed(_) | E::MalformedSignature => ApiError::bad_request(err.to_string()),
            E::NotFoundOrExpired => ApiError::not_found(err.to_string()),
            E::SubjectMismatch => ApiError::forbidden(err.to_string()),
            E::MessageMismatch
            | E::AddressMismatch
            | E::ChainMismatch
            | E::DidMismatch
            | E::RequestIdMismatch => ApiError::bad_request(err.to_string()),
            E::SignatureMismatch => ApiError::new(StatusCode::UNAUTHORIZED, err.to_string()),
            E::DidClaimed => ApiError::conflict(err.to_string()),
            E::Storage(e) => e.into(),
            E::FieldCipher(e) => ApiError::internal(e),
            E::Token(e) => ApiError::internal(e),
        }
    }
}

impl From<ProviderLinkError> for ApiError {
    fn from(err: ProviderLinkError) -> Self {
        use ProviderLinkError as E;
        match err {
            E::Malformed(_) => ApiError::bad_request(err.to_string()),
            E::NotFound => ApiError::not_found(err.to_string()),
            E::DidMismatch | E::KeyMismatch => ApiError::forbidden(err.to_string()),
            E::AlreadyUsed => ApiError::conflict(err.to_string()),
            E::Expired => ApiError::gone(err.to_string()),
            E::InvalidSignature => ApiError::new(StatusCode::UNAUTHORIZED, err.to_string()),
            E::Storage(e) => e.into(),
            E::Token(e) => ApiError::internal(e),
        }
    }
}

impl From<RewardError> for ApiError {
    fn from(err: RewardError) -> Self {
        use RewardError as E;
        match err {
            E::NotConfigured => ApiError::new(StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
            E::UnknownActivity(_) | E::InvalidProofId => ApiError::bad_request(err.to_string()),
            E::WalletNotLinked => ApiError::forbidden(err.to_string()),
            E::AlreadyClaimed => ApiError::conflict(err.to_string()),
            E::InvalidKey(_) | E::InvalidContract | E::Signing(_) => ApiError::internal(err),
            E::Storage(e) => e.into(),
        }
    }
}
