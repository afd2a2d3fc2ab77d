//! Wire DTOs for the HTTP façade. Byte fields are base64-encoded on the
//! wire and never interpreted by the server; timestamps and server-assigned
//! ids are not wire-exposed in this minimal envelope form.

use relay_types::{Envelope, User, Username};
use serde::{Deserialize, Serialize};

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUserRequest {
    pub name: Username,
    #[serde(with = "base64_bytes")]
    pub public_key: Vec<u8>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUserResponse {
    pub name: Username,
    #[serde(with = "base64_bytes")]
    pub public_key: Vec<u8>,
}

impl From<User> for PublicUserResponse {
    fn from(user: User) -> Self {
        Self {
            name: user.username,
            public_key: user.public_key_pem.into_bytes(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthChallengeResponse {
    pub nonce: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthChallengeSignedRequest {
    pub signed_nonce: String,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct BearerTokenResponse {
    pub token: String,
}

/// Wire shape of a message envelope: `{sender, recipient, cipherSymKey,
/// ciphertext}`. Identical for HTTP bodies and WebSocket text frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeWire {
    pub sender: Username,
    pub recipient: Username,
    #[serde(with = "base64_bytes")]
    pub cipher_sym_key: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub ciphertext: Vec<u8>,
}

impl From<Envelope> for EnvelopeWire {
    fn from(e: Envelope) -> Self {
        Self {
            sender: e.sender,
            recipient: e.recipient,
            cipher_sym_key: e.cipher_sym_key,
            ciphertext: e.ciphertext,
        }
    }
}

impl EnvelopeWire {
    pub fn into_envelope(self) -> Envelope {
        Envelope::deposited(self.sender, self.recipient, self.cipher_sym_key, self.ciphertext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_wire_round_trips_through_json() {
        let wire = EnvelopeWire {
            sender: Username::from("alice"),
            recipient: Username::from("bob"),
            cipher_sym_key: vec![1, 2, 3],
            ciphertext: vec![4, 5, 6],
        };
        let json = serde_json::to_string(&wire).unwrap();
        assert!(json.contains("cipherSymKey"));
        let back: EnvelopeWire = serde_json::from_str(&json).unwrap();
        assert_eq!(back.cipher_sym_key, vec![1, 2, 3]);
    }
}
