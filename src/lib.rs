// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Trust Core - Identity & Trust Service
//!
//! Establishes, verifies and revokes caller identity for a social platform:
//! password sessions, wallet-linked sessions (EIP-191 signed challenges) and
//! detached-key provider sessions (Ed25519).
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Signed tokens, sessions, passwords and the identity gate
//! - `crypto` - Key derivation and sensitive field envelopes
//! - `identity` - Wallet and provider challenge/response linking
//! - `privacy` - Block and visibility resolution
//! - `rewards` - Oracle-signed reward claims
//! - `storage` - redb persistence and audit sinks

pub mod api;
pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod privacy;
pub mod rewards;
pub mod state;
pub mod storage;
