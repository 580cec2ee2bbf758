// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Cryptographic Primitives
//!
//! - `secrets` - key derivation, MACs, randomness and encoding helpers
//! - `field` - envelope encryption for individual sensitive string fields

pub mod field;
pub mod secrets;

pub use field::{FieldCipher, FieldCipherError};
