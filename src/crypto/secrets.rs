// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Secret handling helpers shared by the token, field and audit code.

use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

pub type HmacSha256 = Hmac<Sha256>;

/// A 32-byte key wiped from memory on drop.
pub type Key32 = Zeroizing<[u8; 32]>;

/// HMAC-SHA256 of `data` under `key`.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac =
        <HmacSha256 as Mac>::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Derive an independent sub-key from a master secret.
///
/// Different labels give unrelated keys, so one configured secret can back
/// several protocols without a MAC from one validating under another.
pub fn derive_subkey(master: &[u8], label: &str) -> Key32 {
    Zeroizing::new(hmac_sha256(master, label.as_bytes()))
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Constant-time equality for MACs and other secret-derived bytes.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// Fill an array from the OS random number generator.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

pub fn b64url_encode(bytes: &[u8]) -> String {
    Base64UrlUnpadded::encode_string(bytes)
}

pub fn b64url_decode(value: &str) -> Option<Vec<u8>> {
    Base64UrlUnpadded::decode_vec(value).ok()
}

/// Keyed, truncated hash used to pseudonymize request attributes
/// (client IP, user agent) in audit records.
pub fn pseudonymize(key: &[u8], value: &str) -> String {
    let digest = hmac_sha256(key, value.as_bytes());
    alloy::hex::encode(&digest[..12])
}
