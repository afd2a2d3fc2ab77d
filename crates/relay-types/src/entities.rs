//! # Core Domain Entities
//!
//! Users and message envelopes: the two record shapes the store persists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A caller-chosen, printable username. Thin wrapper to keep it out of
/// `String`-typed parameter lists by accident.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Username(pub String);

impl Username {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Username {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Username {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque message identifier assigned by the store. UUIDv7 so that id
/// ordering and sent-at ordering agree, the same convention used for
/// correlation ids elsewhere in this codebase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for MessageId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered peer: username bound to a long-lived RSA public key.
///
/// `public_key_pem` is stored canonicalised (re-encoded PKCS#1 PEM) so that
/// byte-level equality is a meaningful test for "same key".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: Username,
    pub public_key_pem: String,
    pub created_at: DateTime<Utc>,
}

/// A ciphertext envelope, opaque to the server beyond its sender/recipient
/// routing fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: MessageId,
    pub sender: Username,
    pub recipient: Username,
    pub cipher_sym_key: Vec<u8>,
    pub ciphertext: Vec<u8>,
    pub sent_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Envelope {
    /// Construct a fresh, undelivered envelope at deposit time.
    pub fn deposited(sender: Username, recipient: Username, cipher_sym_key: Vec<u8>, ciphertext: Vec<u8>) -> Self {
        Self {
            id: MessageId::new(),
            sender,
            recipient,
            cipher_sym_key,
            ciphertext,
            sent_at: Utc::now(),
            delivered_at: None,
        }
    }
}
