//! Nonce-challenge / signature-verification / bearer-token authentication.
//!
//! Protocol: `GET /auth/{u}` issues a challenge (a random nonce wrapped in a
//! short-lived HS256 JWT carrying `sub`/`nonce`/`exp`). The caller signs the
//! nonce bytes with their RSA private key (unprefixed PKCS#1 v1.5) and posts
//! the signature back; on success the server mints a longer-lived bearer
//! token (`sub`/`exp`).

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use relay_types::Username;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs1v15::Pkcs1v15Sign;
use rsa::pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;
use serde::{Deserialize, Serialize};

use crate::store::{Store, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("unknown user: {0}")]
    UnknownUser(String),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("challenge expired or malformed")]
    ChallengeExpired,

    #[error("bearer token expired or malformed")]
    TokenExpired,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Claims carried by a short-lived challenge token.
#[derive(Debug, Serialize, Deserialize)]
struct ChallengeClaims {
    sub: String,
    nonce: String,
    exp: i64,
}

/// Claims carried by a long-lived bearer token.
#[derive(Debug, Serialize, Deserialize)]
struct BearerClaims {
    sub: String,
    exp: i64,
}

/// A freshly issued authentication challenge.
#[derive(Debug, Clone, Serialize)]
pub struct AuthChallenge {
    /// The raw nonce, base64url-encoded; sign these bytes to answer the
    /// challenge.
    pub nonce: String,
    /// Opaque challenge token to echo back with the signed nonce.
    pub token: String,
}

pub struct Authenticator {
    challenge_secret_key: Vec<u8>,
    bearer_secret_key: Vec<u8>,
    nonce_len: usize,
    challenge_ttl: Duration,
    bearer_ttl: Duration,
}

impl Authenticator {
    pub fn new(
        challenge_secret_key: impl Into<Vec<u8>>,
        bearer_secret_key: impl Into<Vec<u8>>,
        nonce_len: usize,
        challenge_ttl: Duration,
        bearer_ttl: Duration,
    ) -> Self {
        Self {
            challenge_secret_key: challenge_secret_key.into(),
            bearer_secret_key: bearer_secret_key.into(),
            nonce_len,
            challenge_ttl,
            bearer_ttl,
        }
    }

    /// Issues a challenge for `username`. Does not require the user to
    /// already exist; the lookup is deferred to [`Self::verify_challenge`].
    pub fn generate_challenge(&self, username: &Username) -> Result<AuthChallenge, AuthError> {
        let mut bytes = vec![0u8; self.nonce_len];
        rand::thread_rng().fill_bytes(&mut bytes);
        let nonce = URL_SAFE.encode(&bytes);

        let exp = (chrono::Utc::now() + chrono::Duration::from_std(self.challenge_ttl).unwrap()).timestamp();
        let claims = ChallengeClaims {
            sub: username.to_string(),
            nonce: nonce.clone(),
            exp,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(&self.challenge_secret_key),
        )
        .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        Ok(AuthChallenge { nonce, token })
    }

    /// Verifies a signed challenge against the user's registered public key
    /// and, on success, mints a bearer token for that user.
    pub async fn verify_challenge(
        &self,
        challenge_token: &str,
        signed_nonce_b64: &str,
        store: &dyn Store,
    ) -> Result<String, AuthError> {
        let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
        validation.validate_exp = true;
        let decoded = decode::<ChallengeClaims>(
            challenge_token,
            &DecodingKey::from_secret(&self.challenge_secret_key),
            &validation,
        )
        .map_err(|_| AuthError::ChallengeExpired)?;

        let username = Username::from(decoded.claims.sub.clone());
        let user = store
            .get_user(&username)
            .await?
            .ok_or_else(|| AuthError::UnknownUser(decoded.claims.sub.clone()))?;

        let public_key = parse_public_key_pem(&user.public_key_pem)?;

        let nonce_bytes = URL_SAFE
            .decode(&decoded.claims.nonce)
            .map_err(|_| AuthError::ChallengeExpired)?;
        let signature_bytes = URL_SAFE
            .decode(signed_nonce_b64)
            .map_err(|_| AuthError::InvalidSignature)?;

        public_key
            .verify(Pkcs1v15Sign::new_unprefixed(), &nonce_bytes, &signature_bytes)
            .map_err(|_| AuthError::InvalidSignature)?;

        self.generate_bearer(&username)
    }

    fn generate_bearer(&self, username: &Username) -> Result<String, AuthError> {
        let exp = (chrono::Utc::now() + chrono::Duration::from_std(self.bearer_ttl).unwrap()).timestamp();
        let claims = BearerClaims {
            sub: username.to_string(),
            exp,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(&self.bearer_secret_key),
        )
        .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }

    /// Verifies a bearer token and returns the username it authenticates.
    pub fn verify_bearer(&self, token: &str) -> Result<Username, AuthError> {
        let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
        validation.validate_exp = true;
        let decoded = decode::<BearerClaims>(
            token,
            &DecodingKey::from_secret(&self.bearer_secret_key),
            &validation,
        )
        .map_err(|_| AuthError::TokenExpired)?;
        Ok(Username::from(decoded.claims.sub))
    }
}

/// Accepts both PKCS#1 (`RSA PUBLIC KEY`) and PKCS#8 (`PUBLIC KEY`) PEM
/// encodings, matching what Go's `x509.ParsePKIXPublicKey` and
/// `x509.ParsePKCS1PublicKey` together accept.
fn parse_public_key_pem(pem: &str) -> Result<RsaPublicKey, AuthError> {
    RsaPublicKey::from_pkcs1_pem(pem)
        .or_else(|_| RsaPublicKey::from_public_key_pem(pem))
        .map_err(|e| AuthError::InvalidPublicKey(e.to_string()))
}

pub(crate) type SharedAuthenticator = Arc<Authenticator>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RocksStore;
    use rsa::pkcs1::EncodeRsaPublicKey;
    use rsa::{RsaPrivateKey, RsaPublicKey};

    fn test_authenticator() -> Authenticator {
        Authenticator::new(
            "challenge-secret",
            "bearer-secret",
            32,
            Duration::from_secs(300),
            Duration::from_secs(3600),
        )
    }

    #[tokio::test]
    async fn full_challenge_response_round_trip_issues_bearer() {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksStore::open(dir.path().to_str().unwrap()).unwrap();
        let auth = test_authenticator();

        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let public_key = RsaPublicKey::from(&private_key);
        let pem = public_key.to_pkcs1_pem(rsa::pkcs1::LineEnding::LF).unwrap();

        let username = Username::from("alice");
        store.insert_user(&username, &pem).await.unwrap();

        let challenge = auth.generate_challenge(&username).unwrap();
        let nonce_bytes = URL_SAFE.decode(&challenge.nonce).unwrap();

        let signature = private_key
            .sign(Pkcs1v15Sign::new_unprefixed(), &nonce_bytes)
            .unwrap();
        let signed_nonce = URL_SAFE.encode(signature);

        let bearer = auth
            .verify_challenge(&challenge.token, &signed_nonce, &store)
            .await
            .unwrap();
        let verified = auth.verify_bearer(&bearer).unwrap();
        assert_eq!(verified, username);
    }

    #[tokio::test]
    async fn wrong_signature_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksStore::open(dir.path().to_str().unwrap()).unwrap();
        let auth = test_authenticator();

        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let public_key = RsaPublicKey::from(&private_key);
        let pem = public_key.to_pkcs1_pem(rsa::pkcs1::LineEnding::LF).unwrap();

        let username = Username::from("alice");
        store.insert_user(&username, &pem).await.unwrap();

        let challenge = auth.generate_challenge(&username).unwrap();
        let bogus_signature = URL_SAFE.encode(vec![0u8; 256]);

        let err = auth
            .verify_challenge(&challenge.token, &bogus_signature, &store)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidSignature));
    }

    #[test]
    fn expired_bearer_token_is_rejected() {
        let auth = Authenticator::new(
            "challenge-secret",
            "bearer-secret",
            32,
            Duration::from_secs(300),
            Duration::from_millis(1),
        );
        let username = Username::from("alice");
        let token = auth.generate_bearer(&username).unwrap();
        std::thread::sleep(Duration::from_millis(1100));
        let err = auth.verify_bearer(&token).unwrap_err();
        assert!(matches!(err, AuthError::TokenExpired));
    }
}
