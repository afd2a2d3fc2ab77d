//! # Relay Types Crate
//!
//! Domain entities shared between the gateway and the node binary: users,
//! message envelopes, and their newtype identifiers.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: wire and storage shapes for users and
//!   envelopes are defined once, here, and reused by both the HTTP façade
//!   and the RocksDB-backed store.
//! - **Opaque payloads**: `cipher_sym_key` and `ciphertext` are treated as
//!   uninterpreted bytes everywhere in this crate; nothing here ever looks
//!   inside them.

pub mod entities;

pub use entities::*;
