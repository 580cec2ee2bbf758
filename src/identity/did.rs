// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Decentralized identifier formats.
//!
//! - Wallet identities: `did:pkh:eip155:<chainId>:<lowercase 0x address>`
//! - Provider identities: `did:hcn:ed25519:<base64url(SHA-256(public key))>`

use std::str::FromStr;

use alloy::primitives::Address;

use crate::crypto::secrets::{b64url_decode, b64url_encode, sha256};

pub const PKH_DID_PREFIX: &str = "did:pkh:eip155:";
pub const PROVIDER_DID_PREFIX: &str = "did:hcn:ed25519:";

/// Ed25519 public keys are exactly 32 bytes.
pub const ED25519_PUBLIC_KEY_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DidError {
    #[error("address must be 0x followed by 40 hex characters")]
    InvalidAddress,

    #[error("chain id must be a positive integer")]
    InvalidChainId,

    #[error("malformed DID")]
    InvalidDid,
}

/// Parse a `0x`-prefixed 20-byte hex address (any case).
pub fn parse_address(value: &str) -> Result<Address, DidError> {
    let hex = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .ok_or(DidError::InvalidAddress)?;
    if hex.len() != 40 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(DidError::InvalidAddress);
    }
    Address::from_str(hex).map_err(|_| DidError::InvalidAddress)
}

/// Lowercase `0x` form used in DIDs and storage.
pub fn lowercase_address(address: &Address) -> String {
    format!("0x{}", alloy::hex::encode(address.as_slice()))
}

pub fn pkh_did(chain_id: u64, address: &Address) -> String {
    format!("{PKH_DID_PREFIX}{chain_id}:{}", lowercase_address(address))
}

/// Split a `did:pkh:eip155` identifier into chain id and address.
pub fn parse_pkh_did(did: &str) -> Result<(u64, Address), DidError> {
    let rest = did.strip_prefix(PKH_DID_PREFIX).ok_or(DidError::InvalidDid)?;
    let (chain, address) = rest.split_once(':').ok_or(DidError::InvalidDid)?;
    let chain_id: u64 = chain.parse().map_err(|_| DidError::InvalidDid)?;
    if chain_id == 0 {
        return Err(DidError::InvalidChainId);
    }
    Ok((chain_id, parse_address(address)?))
}

/// Fingerprint of a provider public key.
pub fn key_fingerprint(public_key: &[u8]) -> String {
    b64url_encode(&sha256(public_key))
}

pub fn provider_did(public_key: &[u8]) -> String {
    format!("{PROVIDER_DID_PREFIX}{}", key_fingerprint(public_key))
}

/// Check the shape of a provider DID: known prefix and a fingerprint that
/// decodes to a SHA-256 digest.
pub fn validate_provider_did(did: &str) -> Result<(), DidError> {
    let fingerprint = did
        .strip_prefix(PROVIDER_DID_PREFIX)
        .ok_or(DidError::InvalidDid)?;
    match b64url_decode(fingerprint) {
        Some(digest) if digest.len() == 32 => Ok(()),
        _ => Err(DidError::InvalidDid),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDRESS: &str = "0x52908400098527886E0F7030069857D2E4169EE7";

    #[test]
    fn pkh_did_uses_lowercase_address() {
        let address = parse_address(ADDRESS).unwrap();
        let did = pkh_did(1, &address);
        assert_eq!(did, "did:pkh:eip155:1:0x52908400098527886e0f7030069857d2e4169ee7");

        let (chain_id, parsed) = parse_pkh_did(&did).unwrap();
        assert_eq!(chain_id, 1);
        assert_eq!(parsed, address);
    }

    #[test]
    fn rejects_bad_addresses() {
        for bad in [
            "52908400098527886E0F7030069857D2E4169EE7",
            "0x1234",
            "0xZZ908400098527886E0F7030069857D2E4169EE7",
            "",
        ] {
            assert_eq!(parse_address(bad), Err(DidError::InvalidAddress), "{bad}");
        }
    }

    #[test]
    fn rejects_bad_pkh_dids() {
        let zero_chain = "did:pkh:eip155:0:0x52908400098527886e0f7030069857d2e4169ee7";
        assert!(parse_pkh_did(zero_chain).is_err());
        assert!(parse_pkh_did("did:pkh:solana:1:abc").is_err());
        assert!(parse_pkh_did("did:pkh:eip155:1").is_err());
    }

    #[test]
    fn provider_did_binds_key_fingerprint() {
        let key = [7u8; ED25519_PUBLIC_KEY_LEN];
        let did = provider_did(&key);
        assert!(did.starts_with(PROVIDER_DID_PREFIX));
        assert!(validate_provider_did(&did).is_ok());
        assert_ne!(did, provider_did(&[8u8; ED25519_PUBLIC_KEY_LEN]));
    }

    #[test]
    fn provider_did_shape_is_checked() {
        assert!(validate_provider_did("did:hcn:ed25519:short").is_err());
        assert!(validate_provider_did("did:key:z6Mk").is_err());
        assert!(validate_provider_did("did:hcn:ed25519:").is_err());
    }
}
