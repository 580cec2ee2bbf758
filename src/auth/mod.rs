// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! First-party sessions, provider sessions and the identity gate.
//!
//! ## Auth Flow
//!
//! 1. Client signs in (password) or links a wallet / provider key
//! 2. Server mints a session record and a signed token referencing it
//! 3. Client sends `Authorization: Bearer <payload>.<signature>`
//! 4. The gate:
//!    - Verifies the token MAC, protocol binding and expiry
//!    - Looks up the session record and requires it to be live and owned by
//!      the token subject
//!    - Attaches the canonical subject id to the request
//!
//! ## Security
//!
//! - Each token protocol has its own key, type, issuer and audience
//! - Session liveness is re-read on every request, never cached
//! - Every denial is a uniform 401; the reason goes to the audit trail only

pub mod claims;
pub mod error;
pub mod extractor;
pub mod gate;
pub mod password;
pub mod sessions;
pub mod token;

pub use claims::{AuthenticatedUser, ProviderPrincipal};
pub use error::AuthError;
pub use extractor::{Auth, ProviderAuth};
pub use gate::{DenialReason, GateError, IdentityGate};
pub use password::{PasswordAuthenticator, PasswordError};
pub use sessions::{IssuedSession, SessionError, SessionIssuer};
pub use token::{TokenCodec, TokenCodecs, TokenError};
