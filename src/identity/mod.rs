// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Identity Linking
//!
//! Challenge/response engines that bind external key material to an
//! identity:
//!
//! - [`wallet`]: secp256k1 wallets, EIP-191 signature recovery, `did:pkh`
//! - [`provider`]: detached Ed25519 keys, `did:hcn:ed25519`
//!
//! Both engines issue single-use, time-boxed challenges and consume them
//! atomically inside a redb write transaction.

pub mod did;
pub mod provider;
pub mod scopes;
pub mod wallet;

pub use provider::{ProviderLinkError, ProviderLinker, ProviderProof, PROVIDER_ALGORITHM};
pub use wallet::{WalletLink, WalletLinkError, WalletLinker, WalletProof};
