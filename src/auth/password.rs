// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Password credentials for first-party sign-in.
//!
//! Passwords are hashed with Argon2id. Logins are stored only as a blind
//! index: HMAC-SHA256 over the NFKC-normalized, trimmed, lower-cased login.
//!
//! Both calls run Argon2 and block; async callers should move them onto
//! `tokio::task::spawn_blocking`.

use std::sync::OnceLock;

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, ParamsBuilder,
};
use chrono::Utc;
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::crypto::secrets::{derive_subkey, hmac_sha256, random_bytes, Key32};
use crate::storage::{CredentialRepository, StorageError, StoredCredential, TrustDatabase};

/// The memory cost for Argon2 in MB.
const ARGON2_MEMORY_MB: u32 = 19;
/// The number of iterations for Argon2.
const ARGON2_ITERATIONS: u32 = 3;
/// The parallelism factor for Argon2.
const ARGON2_PARALLELISM: u32 = 6;

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 256;
const MAX_LOGIN_LEN: usize = 320;

const LOGIN_INDEX_LABEL: &str = "hcn/login-index/v1";
const DUMMY_PASSWORD: &str = "hcn-unknown-login-placeholder";

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("login is empty or too long")]
    InvalidLogin,

    #[error("password must be between {MIN_PASSWORD_LEN} and {MAX_PASSWORD_LEN} characters")]
    WeakPassword,

    #[error("login is already registered")]
    LoginTaken,

    /// Unknown login or wrong password; never distinguished.
    #[error("invalid login or password")]
    InvalidCredentials,

    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Hash a password with Argon2id and a random 16-byte salt.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let password_bytes = Zeroizing::new(password.as_bytes().to_vec());

    let salt = SaltString::encode_b64(&random_bytes::<16>())
        .map_err(|e| PasswordError::Hashing(format!("salt encoding: {e}")))?;

    let params = ParamsBuilder::new()
        .m_cost(ARGON2_MEMORY_MB * 1024)
        .t_cost(ARGON2_ITERATIONS)
        .p_cost(ARGON2_PARALLELISM)
        .build()
        .map_err(|e| PasswordError::Hashing(format!("argon2 params: {e}")))?;
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let hash = argon2
        .hash_password(&password_bytes, &salt)
        .map_err(|e| PasswordError::Hashing(e.to_string()))?
        .to_string();

    Ok(hash)
}

/// Check a password against a stored PHC string. Parameters come from the
/// hash itself.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let password_bytes = Zeroizing::new(password.as_bytes().to_vec());
    let parsed = PasswordHash::new(hash).map_err(|e| PasswordError::Hashing(e.to_string()))?;
    Ok(Argon2::default().verify_password(&password_bytes, &parsed).is_ok())
}

/// Hash checked when a login is unknown, so that path costs one Argon2
/// verification like a real miss does.
fn dummy_hash() -> Result<&'static str, PasswordError> {
    static DUMMY_HASH: OnceLock<String> = OnceLock::new();
    if let Some(hash) = DUMMY_HASH.get() {
        return Ok(hash);
    }
    let hash = hash_password(DUMMY_PASSWORD)?;
    Ok(DUMMY_HASH.get_or_init(|| hash))
}

/// Canonical form of a login before indexing.
pub fn normalize_login(login: &str) -> String {
    login.nfkc().collect::<String>().trim().to_lowercase()
}

/// Registers and authenticates password credentials.
pub struct PasswordAuthenticator<'a> {
    db: &'a TrustDatabase,
    index_key: Key32,
}

impl<'a> PasswordAuthenticator<'a> {
    pub fn new(db: &'a TrustDatabase, token_secret: &[u8]) -> Self {
        Self {
            db,
            index_key: derive_subkey(token_secret, LOGIN_INDEX_LABEL),
        }
    }

    /// Blind index of a login.
    pub fn login_index(&self, login: &str) -> Result<String, PasswordError> {
        let normalized = normalize_login(login);
        if normalized.is_empty() || normalized.len() > MAX_LOGIN_LEN {
            return Err(PasswordError::InvalidLogin);
        }
        Ok(alloy::hex::encode(hmac_sha256(self.index_key.as_slice(), normalized.as_bytes())))
    }

    /// Create a credential and return the new subject id.
    pub fn register(&self, login: &str, password: &str) -> Result<String, PasswordError> {
        let login_index = self.login_index(login)?;
        let length = password.chars().count();
        if !(MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&length) {
            return Err(PasswordError::WeakPassword);
        }

        let credential = StoredCredential {
            subject_id: Uuid::new_v4().to_string(),
            login_index,
            password_hash: hash_password(password)?,
            created_at: Utc::now(),
        };

        match CredentialRepository::new(self.db).create(&credential) {
            Ok(()) => {}
            Err(StorageError::AlreadyExists(_)) => return Err(PasswordError::LoginTaken),
            Err(e) => return Err(e.into()),
        }

        tracing::info!(subject_id = %credential.subject_id, "Credential registered");
        Ok(credential.subject_id)
    }

    /// Resolve a login/password pair to its subject id.
    ///
    /// Unknown and malformed logins still pay for one Argon2 verification.
    pub fn authenticate(&self, login: &str, password: &str) -> Result<String, PasswordError> {
        let credential = match self.login_index(login) {
            Ok(login_index) => CredentialRepository::new(self.db).get(&login_index)?,
            Err(_) => None,
        };

        let Some(credential) = credential else {
            verify_password(password, dummy_hash()?)?;
            return Err(PasswordError::InvalidCredentials);
        };

        if !verify_password(password, &credential.password_hash)? {
            return Err(PasswordError::InvalidCredentials);
        }
        Ok(credential.subject_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"token-secret-0123456789abcdef0123456789";

    #[test]
    fn hash_then_verify() {
        let hash = hash_password("correct horse battery").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse battery", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }

    #[test]
    fn login_index_normalizes() {
        let db = TrustDatabase::in_memory().unwrap();
        let auth = PasswordAuthenticator::new(&db, SECRET);

        let a = auth.login_index("  Alice@Example.COM ").unwrap();
        let b = auth.login_index("alice@example.com").unwrap();
        // Fullwidth letters fold to ASCII under NFKC.
        let c = auth.login_index("ａｌｉｃｅ@example.com").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert!(!a.contains("alice"));
        assert!(matches!(auth.login_index("   "), Err(PasswordError::InvalidLogin)));
    }

    #[test]
    fn register_and_authenticate() {
        let db = TrustDatabase::in_memory().unwrap();
        let auth = PasswordAuthenticator::new(&db, SECRET);

        let subject = auth.register("alice@example.com", "s3cure-passw0rd").unwrap();
        assert_eq!(auth.authenticate("ALICE@example.com", "s3cure-passw0rd").unwrap(), subject);

        assert!(matches!(
            auth.authenticate("alice@example.com", "nope-nope-nope"),
            Err(PasswordError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.authenticate("bob@example.com", "s3cure-passw0rd"),
            Err(PasswordError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.register("alice@example.com", "another-password"),
            Err(PasswordError::LoginTaken)
        ));
    }

    #[test]
    fn unknown_login_verifies_against_same_parameters() {
        let real = hash_password("s3cure-passw0rd").unwrap();
        let dummy = dummy_hash().unwrap();
        // `$argon2id$v=19$m=...,t=...,p=...$salt$hash`
        let params = |hash: &str| hash.split('$').take(4).collect::<Vec<_>>().join("$");
        assert_eq!(params(dummy), params(&real));
        assert!(std::ptr::eq(dummy, dummy_hash().unwrap()));

        let db = TrustDatabase::in_memory().unwrap();
        let auth = PasswordAuthenticator::new(&db, SECRET);
        assert!(matches!(
            auth.authenticate("nobody@example.com", DUMMY_PASSWORD),
            Err(PasswordError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.authenticate("   ", "whatever-password"),
            Err(PasswordError::InvalidCredentials)
        ));
    }

    #[test]
    fn short_password_is_rejected() {
        let db = TrustDatabase::in_memory().unwrap();
        let auth = PasswordAuthenticator::new(&db, SECRET);
        assert!(matches!(
            auth.register("a@b.c", "short"),
            Err(PasswordError::WeakPassword)
        ));
    }
}
