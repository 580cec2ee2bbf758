// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Envelope encryption for sensitive string fields (phone numbers, wallet
//! addresses) stored at rest.
//!
//! ## Envelope Format
//!
//! ```text
//! enc:v1:<iv b64url>:<tag b64url>:<ciphertext b64url>
//! ```
//!
//! - AES-256-GCM, 12-byte random IV, 16-byte authentication tag
//! - The logical field name is bound as additional authenticated data, so a
//!   ciphertext copied from `phone` into `wallet_address` fails to decrypt
//! - Values without the prefix are legacy plaintext and are returned as-is

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use base64ct::{Base64, Encoding};

use super::secrets::{b64url_decode, b64url_encode, random_bytes, sha256, Key32};
use crate::config::TrustConfig;

pub const ENVELOPE_PREFIX: &str = "enc:v1:";
/// Every envelope version starts with this marker.
const ENVELOPE_MARKER: &str = "enc:";

const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum FieldCipherError {
    /// Encryption is mandatory but no key is configured.
    #[error("field encryption key is not configured")]
    KeyUnavailable,

    #[error("malformed envelope for field {0}")]
    MalformedEnvelope(String),

    /// Tag mismatch: wrong key, wrong field, or tampered bytes.
    #[error("envelope authentication failed for field {0}")]
    Authentication(String),

    #[error("encryption failed")]
    Encryption,
}

/// Encrypts and decrypts individual fields, independent of where they are stored.
#[derive(Clone)]
pub struct FieldCipher {
    key: Option<Key32>,
    require_encryption: bool,
}

impl std::fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldCipher")
            .field("has_key", &self.key.is_some())
            .field("require_encryption", &self.require_encryption)
            .finish()
    }
}

impl FieldCipher {
    pub fn new(secret: Option<&str>, require_encryption: bool) -> Result<Self, FieldCipherError> {
        if require_encryption && secret.is_none() {
            return Err(FieldCipherError::KeyUnavailable);
        }
        Ok(Self {
            key: secret.map(derive_field_key),
            require_encryption,
        })
    }

    pub fn from_config(config: &TrustConfig) -> Result<Self, FieldCipherError> {
        Self::new(
            config.field_encryption_key.as_deref().map(String::as_str),
            config.require_field_encryption,
        )
    }

    /// Any `enc:` value is treated as an envelope, whatever its version.
    pub fn is_envelope(value: &str) -> bool {
        value.starts_with(ENVELOPE_MARKER)
    }

    /// Encrypt `plaintext` for the logical field `field`.
    ///
    /// Without a key (and with the policy flag off) the value is stored as
    /// plaintext; a warning is logged so the gap stays visible.
    pub fn encrypt(&self, field: &str, plaintext: &str) -> Result<String, FieldCipherError> {
        let Some(key) = &self.key else {
            if self.require_encryption {
                return Err(FieldCipherError::KeyUnavailable);
            }
            tracing::warn!(field, "storing sensitive field without encryption");
            return Ok(plaintext.to_string());
        };

        let cipher = Aes256Gcm::new_from_slice(&key[..]).map_err(|_| FieldCipherError::Encryption)?;
        let iv: [u8; IV_LEN] = random_bytes();
        let aad = associated_data(field);

        let sealed = cipher
            .encrypt(
                Nonce::from_slice(&iv),
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: aad.as_bytes(),
                },
            )
            .map_err(|_| FieldCipherError::Encryption)?;

        // aes-gcm appends the tag to the ciphertext
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);

        Ok(format!(
            "{ENVELOPE_PREFIX}{}:{}:{}",
            b64url_encode(&iv),
            b64url_encode(tag),
            b64url_encode(ciphertext)
        ))
    }

    /// Decrypt a stored value for `field`.
    ///
    /// Non-envelope values are returned unchanged. Any tampering, including
    /// with the `enc:v1:` prefix itself, fails closed.
    pub fn decrypt(&self, field: &str, stored: &str) -> Result<String, FieldCipherError> {
        if !Self::is_envelope(stored) {
            return Ok(stored.to_string());
        }
        let malformed = || FieldCipherError::MalformedEnvelope(field.to_string());
        let body = stored.strip_prefix(ENVELOPE_PREFIX).ok_or_else(malformed)?;
        let key = self.key.as_ref().ok_or(FieldCipherError::KeyUnavailable)?;

        let mut parts = body.split(':');
        let (Some(iv), Some(tag), Some(ciphertext), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(malformed());
        };

        let iv = b64url_decode(iv).filter(|v| v.len() == IV_LEN).ok_or_else(malformed)?;
        let tag = b64url_decode(tag).filter(|v| v.len() == TAG_LEN).ok_or_else(malformed)?;
        let mut sealed = b64url_decode(ciphertext).ok_or_else(malformed)?;
        sealed.extend_from_slice(&tag);

        let cipher = Aes256Gcm::new_from_slice(&key[..]).map_err(|_| FieldCipherError::Encryption)?;
        let aad = associated_data(field);
        let plaintext = cipher
            .decrypt(
                Nonce::from_slice(&iv),
                Payload {
                    msg: &sealed,
                    aad: aad.as_bytes(),
                },
            )
            .map_err(|_| FieldCipherError::Authentication(field.to_string()))?;

        String::from_utf8(plaintext).map_err(|_| malformed())
    }
}

fn associated_data(field: &str) -> String {
    format!("v1:{field}")
}

/// Turn the configured secret into an AES-256 key.
///
/// 64 hex characters or base64 of exactly 32 bytes are used as raw key
/// material; anything else is hashed with SHA-256.
pub fn derive_field_key(secret: &str) -> Key32 {
    let trimmed = secret.trim();
    if trimmed.len() == 64 {
        if let Ok(raw) = alloy::hex::decode(trimmed) {
            if let Ok(key) = <[u8; 32]>::try_from(raw.as_slice()) {
                return Key32::new(key);
            }
        }
    }
    if let Ok(raw) = Base64::decode_vec(trimmed) {
        if let Ok(key) = <[u8; 32]>::try_from(raw.as_slice()) {
            return Key32::new(key);
        }
    }
    Key32::new(sha256(trimmed.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> FieldCipher {
        FieldCipher::new(Some("unit-test-field-secret"), true).unwrap()
    }

    #[test]
    fn encrypt_then_decrypt_returns_plaintext() {
        let c = cipher();
        let stored = c.encrypt("phone", "+15551234567").unwrap();
        assert!(FieldCipher::is_envelope(&stored));
        assert!(!stored.contains("5551234567"));
        assert_eq!(c.decrypt("phone", &stored).unwrap(), "+15551234567");
    }

    #[test]
    fn same_plaintext_gets_fresh_iv() {
        let c = cipher();
        assert_ne!(c.encrypt("phone", "x").unwrap(), c.encrypt("phone", "x").unwrap());
    }

    #[test]
    fn plaintext_passes_through_decrypt() {
        let c = cipher();
        assert_eq!(c.decrypt("phone", "+15551234567").unwrap(), "+15551234567");
    }

    #[test]
    fn envelope_is_bound_to_field_name() {
        let c = cipher();
        let stored = c.encrypt("phone", "+15551234567").unwrap();
        assert!(matches!(
            c.decrypt("wallet_address", &stored),
            Err(FieldCipherError::Authentication(_))
        ));
    }

    #[test]
    fn tampering_any_part_fails_closed() {
        let c = cipher();
        let stored = c.encrypt("wallet_address", "0xabc").unwrap();
        let body = stored.strip_prefix(ENVELOPE_PREFIX).unwrap();
        let parts: Vec<&str> = body.split(':').collect();

        for index in 0..3 {
            let mut raw = b64url_decode(parts[index]).unwrap();
            raw[0] ^= 0x01;
            let mut tampered: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
            tampered[index] = b64url_encode(&raw);
            let envelope = format!("{ENVELOPE_PREFIX}{}", tampered.join(":"));
            let result = c.decrypt("wallet_address", &envelope);
            assert!(
                matches!(result, Err(FieldCipherError::Authentication(_))),
                "part {index} tamper should fail authentication"
            );
        }
    }

    #[test]
    fn wrong_key_fails_closed() {
        let stored = cipher().encrypt("phone", "secret").unwrap();
        let other = FieldCipher::new(Some("a-different-secret"), true).unwrap();
        assert!(matches!(
            other.decrypt("phone", &stored),
            Err(FieldCipherError::Authentication(_))
        ));
    }

    #[test]
    fn malformed_envelope_is_rejected() {
        let c = cipher();
        assert!(matches!(
            c.decrypt("phone", "enc:v1:only:two"),
            Err(FieldCipherError::MalformedEnvelope(_))
        ));
        assert!(matches!(
            c.decrypt("phone", "enc:v1:AAAA:AAAA:AAAA:extra"),
            Err(FieldCipherError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn tampered_prefix_fails_closed() {
        let c = cipher();
        let sealed = c.encrypt("phone", "+15551234567").unwrap();
        let body = sealed.strip_prefix(ENVELOPE_PREFIX).unwrap();

        for prefix in ["enc:v2:", "enc:V1:", "enc:v1", "enc:"] {
            let tampered = format!("{prefix}{body}");
            let result = c.decrypt("phone", &tampered);
            assert!(
                matches!(result, Err(FieldCipherError::MalformedEnvelope(_))),
                "{tampered} decrypted"
            );
        }
        assert!(FieldCipher::is_envelope("enc:v2:abc"));
        assert!(!FieldCipher::is_envelope("0x52908400098527886e0f7030069857d2e4169ee7"));
    }

    #[test]
    fn required_policy_needs_key() {
        assert!(matches!(FieldCipher::new(None, true), Err(FieldCipherError::KeyUnavailable)));
    }

    #[test]
    fn optional_policy_without_key_stores_plaintext() {
        let c = FieldCipher::new(None, false).unwrap();
        assert_eq!(c.encrypt("phone", "+1555").unwrap(), "+1555");
        assert!(matches!(
            c.decrypt("phone", "enc:v1:a:b:c"),
            Err(FieldCipherError::KeyUnavailable)
        ));
    }

    #[test]
    fn raw_hex_and_base64_keys_are_used_directly() {
        let hex_key = "11".repeat(32);
        assert_eq!(*derive_field_key(&hex_key), [0x11u8; 32]);

        let b64_key = Base64::encode_string(&[0x22u8; 32]);
        assert_eq!(*derive_field_key(&b64_key), [0x22u8; 32]);

        assert_eq!(*derive_field_key("passphrase"), sha256(b"passphrase"));
    }
}
