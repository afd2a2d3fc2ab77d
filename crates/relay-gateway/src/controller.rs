//! Domain operations over the store: register user, deposit, drain.
//!
//! A thin layer between the HTTP façade and [`Store`]; it owns PEM
//! validation and the few invariants ([`User`] immutability) that don't
//! belong in the persistence layer itself.

use relay_types::{Envelope, User, Username};
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;
use std::sync::Arc;

use crate::domain::RelayError;
use crate::store::Store;

#[derive(Clone)]
pub struct RelayController {
    store: Arc<dyn Store>,
}

impl RelayController {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Parses and validates the PEM, canonicalises it, then delegates to
    /// `Store::insert_user`. Returns whether the user already existed.
    pub async fn register_user(&self, username: Username, public_key_pem: &str) -> Result<bool, RelayError> {
        let canonical = canonicalize_public_key_pem(public_key_pem)?;
        let already_existed = self.store.insert_user(&username, &canonical).await?;
        Ok(already_existed)
    }

    /// Exposes the underlying store so the authenticator can look up a
    /// subject's public key during challenge verification without the
    /// controller needing to own auth logic itself.
    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub async fn get_user(&self, username: &Username) -> Result<User, RelayError> {
        self.store
            .get_user(username)
            .await?
            .ok_or_else(|| RelayError::NotFound(format!("no such user: {username}")))
    }

    /// Persists a ciphertext envelope. Never checks recipient existence.
    pub async fn deposit_message(&self, envelope: Envelope) -> Result<Envelope, RelayError> {
        Ok(self.store.insert_message(envelope).await?)
    }

    /// Drains and marks delivered every undelivered envelope for `username`.
    pub async fn drain_messages(&self, username: &Username) -> Result<Vec<Envelope>, RelayError> {
        Ok(self.store.drain_undelivered(username).await?)
    }
}

/// Re-encodes the key as canonical PKCS#1 PEM so that byte-level equality
/// is a meaningful "same key" test across re-registrations, regardless of
/// which PEM flavor the caller submitted.
fn canonicalize_public_key_pem(pem: &str) -> Result<String, RelayError> {
    use rsa::pkcs1::EncodeRsaPublicKey;

    let key = RsaPublicKey::from_pkcs1_pem(pem)
        .or_else(|_| RsaPublicKey::from_public_key_pem(pem))
        .map_err(|e| RelayError::BadRequest(format!("malformed public key: {e}")))?;

    key.to_pkcs1_pem(rsa::pkcs1::LineEnding::LF)
        .map_err(|e| RelayError::Internal(format!("failed to re-encode public key: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RocksStore;
    use rsa::pkcs1::EncodeRsaPublicKey;
    use rsa::RsaPrivateKey;

    fn test_controller() -> (RelayController, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksStore::open(dir.path().to_str().unwrap()).unwrap();
        (RelayController::new(Arc::new(store)), dir)
    }

    fn generate_pem() -> String {
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let public_key = RsaPublicKey::from(&private_key);
        public_key.to_pkcs1_pem(rsa::pkcs1::LineEnding::LF).unwrap().to_string()
    }

    #[tokio::test]
    async fn register_rejects_malformed_pem() {
        let (controller, _dir) = test_controller();
        let err = controller
            .register_user(Username::from("alice"), "not a pem")
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::BadRequest(_)));
    }

    #[tokio::test]
    async fn deposit_succeeds_even_for_unknown_recipient() {
        let (controller, _dir) = test_controller();
        let envelope = Envelope::deposited(
            Username::from("alice"),
            Username::from("ghost"),
            vec![1],
            vec![2],
        );
        let stored = controller.deposit_message(envelope).await.unwrap();
        assert_eq!(stored.recipient.as_str(), "ghost");
    }

    #[tokio::test]
    async fn drain_then_drain_again_returns_empty_second_time() {
        let (controller, _dir) = test_controller();
        let pem = generate_pem();
        let alice = Username::from("alice");
        controller.register_user(alice.clone(), &pem).await.unwrap();

        let envelope = Envelope::deposited(Username::from("bob"), alice.clone(), vec![1], vec![2]);
        controller.deposit_message(envelope).await.unwrap();

        let drained = controller.drain_messages(&alice).await.unwrap();
        assert_eq!(drained.len(), 1);
        let second = controller.drain_messages(&alice).await.unwrap();
        assert!(second.is_empty());
    }
}
