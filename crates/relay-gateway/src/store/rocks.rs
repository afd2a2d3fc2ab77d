//! RocksDB-backed implementation of [`Store`].
//!
//! ## Column families
//!
//! - `users` — key: username, value: bincode-encoded [`User`].
//! - `messages` — key: message id (16 raw UUID bytes), value: bincode-encoded
//!   [`Envelope`].
//! - `messages_by_recipient` — key: `recipient ++ sent_at_millis (big-endian)
//!   ++ id`, empty value. An ordered index so undelivered envelopes for a
//!   recipient can be prefix-scanned in `sent_at` order without a table scan.

use async_trait::async_trait;
use relay_types::{Envelope, MessageId, User, Username};
use rocksdb::{ColumnFamilyDescriptor, Options, DB};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{Store, StoreError, StoreResult};

const CF_USERS: &str = "users";
const CF_MESSAGES: &str = "messages";
const CF_MESSAGES_BY_RECIPIENT: &str = "messages_by_recipient";

const COLUMN_FAMILIES: &[&str] = &[CF_USERS, CF_MESSAGES, CF_MESSAGES_BY_RECIPIENT];

pub struct RocksStore {
    db: Arc<DB>,
    /// Serializes drain operations store-wide so that a concurrent second
    /// drain never observes an envelope already claimed by another drain.
    /// Coarser than per-recipient locking but sufficient at this scale and
    /// avoids depending on rocksdb's transaction feature, which nothing else
    /// in this codebase uses.
    drain_lock: Mutex<()>,
}

impl RocksStore {
    /// Opens (or creates) the database at `path`. A `rocksdb://` prefix, if
    /// present, is stripped.
    pub fn open(path: &str) -> StoreResult<Self> {
        let path = path.strip_prefix("rocksdb://").unwrap_or(path);

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Snappy);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&opts, Path::new(path), cf_descriptors)
            .map_err(|e| StoreError::Backend(format!("failed to open rocksdb at {path}: {e}")))?;

        Ok(Self {
            db: Arc::new(db),
            drain_lock: Mutex::new(()),
        })
    }

    fn cf_users(&self) -> &rocksdb::ColumnFamily {
        self.db.cf_handle(CF_USERS).expect("users column family exists")
    }

    fn cf_messages(&self) -> &rocksdb::ColumnFamily {
        self.db
            .cf_handle(CF_MESSAGES)
            .expect("messages column family exists")
    }

    fn cf_messages_by_recipient(&self) -> &rocksdb::ColumnFamily {
        self.db
            .cf_handle(CF_MESSAGES_BY_RECIPIENT)
            .expect("messages_by_recipient column family exists")
    }

    fn recipient_index_key(recipient: &Username, sent_at_millis: i64, id: MessageId) -> Vec<u8> {
        let mut key = Vec::with_capacity(recipient.as_str().len() + 1 + 8 + 16);
        key.extend_from_slice(recipient.as_str().as_bytes());
        key.push(0); // NUL separator: usernames cannot contain NUL
        key.extend_from_slice(&sent_at_millis.to_be_bytes());
        key.extend_from_slice(id.as_uuid().as_bytes());
        key
    }

    fn recipient_prefix(recipient: &Username) -> Vec<u8> {
        let mut prefix = recipient.as_str().as_bytes().to_vec();
        prefix.push(0);
        prefix
    }

    fn fetch_envelope(&self, id: MessageId) -> StoreResult<Option<Envelope>> {
        let raw = self
            .db
            .get_cf(self.cf_messages(), id.as_uuid().as_bytes())
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        raw.map(|bytes| {
            bincode::deserialize::<Envelope>(&bytes).map_err(|e| StoreError::Encoding(e.to_string()))
        })
        .transpose()
    }

    fn put_envelope(&self, envelope: &Envelope) -> StoreResult<()> {
        let bytes = bincode::serialize(envelope).map_err(|e| StoreError::Encoding(e.to_string()))?;
        self.db
            .put_cf(self.cf_messages(), envelope.id.as_uuid().as_bytes(), bytes)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}

#[async_trait]
impl Store for RocksStore {
    async fn insert_user(&self, username: &Username, public_key_pem: &str) -> StoreResult<bool> {
        let key = username.as_str().as_bytes();
        let existing = self
            .db
            .get_cf(self.cf_users(), key)
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        if let Some(raw) = existing {
            let existing_user: User =
                bincode::deserialize(&raw).map_err(|e| StoreError::Encoding(e.to_string()))?;
            if existing_user.public_key_pem == public_key_pem {
                return Ok(true);
            }
            return Err(StoreError::AlreadyExists(format!(
                "user {username} already registered with a different public key"
            )));
        }

        let user = User {
            username: username.clone(),
            public_key_pem: public_key_pem.to_string(),
            created_at: chrono::Utc::now(),
        };
        let bytes = bincode::serialize(&user).map_err(|e| StoreError::Encoding(e.to_string()))?;
        self.db
            .put_cf(self.cf_users(), key, bytes)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(false)
    }

    async fn get_user(&self, username: &Username) -> StoreResult<Option<User>> {
        let raw = self
            .db
            .get_cf(self.cf_users(), username.as_str().as_bytes())
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        raw.map(|bytes| bincode::deserialize(&bytes).map_err(|e| StoreError::Encoding(e.to_string())))
            .transpose()
    }

    async fn insert_message(&self, envelope: Envelope) -> StoreResult<Envelope> {
        self.put_envelope(&envelope)?;
        let index_key =
            Self::recipient_index_key(&envelope.recipient, envelope.sent_at.timestamp_millis(), envelope.id);
        self.db
            .put_cf(self.cf_messages_by_recipient(), index_key, [])
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(envelope)
    }

    async fn get_undelivered_for_recipient(&self, username: &Username) -> StoreResult<Vec<Envelope>> {
        let prefix = Self::recipient_prefix(username);
        let iter = self.db.prefix_iterator_cf(self.cf_messages_by_recipient(), &prefix);

        let mut out = Vec::new();
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Backend(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            let id_bytes = &key[key.len() - 16..];
            let id = MessageId::from(uuid::Uuid::from_slice(id_bytes).map_err(|e| StoreError::Encoding(e.to_string()))?);
            if let Some(envelope) = self.fetch_envelope(id)? {
                if envelope.delivered_at.is_none() {
                    out.push(envelope);
                }
            }
        }
        out.sort_by_key(|e| e.sent_at);
        Ok(out)
    }

    async fn mark_delivered(&self, id: MessageId) -> StoreResult<()> {
        let Some(mut envelope) = self.fetch_envelope(id)? else {
            return Ok(());
        };
        if envelope.delivered_at.is_some() {
            return Ok(());
        }
        envelope.delivered_at = Some(chrono::Utc::now());
        self.put_envelope(&envelope)
    }

    async fn drain_undelivered(&self, username: &Username) -> StoreResult<Vec<Envelope>> {
        let _guard = self.drain_lock.lock().await;
        let undelivered = self.get_undelivered_for_recipient(username).await?;
        for envelope in &undelivered {
            self.mark_delivered(envelope.id).await?;
        }
        Ok(undelivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_types::Envelope;

    fn temp_store() -> (RocksStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksStore::open(dir.path().to_str().unwrap()).unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn register_then_reregister_same_key_is_idempotent() {
        let (store, _dir) = temp_store();
        let username = Username::from("alice");
        assert_eq!(store.insert_user(&username, "pem-a").await.unwrap(), false);
        assert_eq!(store.insert_user(&username, "pem-a").await.unwrap(), true);
    }

    #[tokio::test]
    async fn reregister_with_different_key_conflicts() {
        let (store, _dir) = temp_store();
        let username = Username::from("alice");
        store.insert_user(&username, "pem-a").await.unwrap();
        let err = store.insert_user(&username, "pem-b").await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn drain_returns_in_order_and_marks_delivered() {
        let (store, _dir) = temp_store();
        let alice = Username::from("alice");
        let bob = Username::from("bob");

        for _ in 0..3 {
            let envelope = Envelope::deposited(bob.clone(), alice.clone(), vec![1], vec![2]);
            store.insert_message(envelope).await.unwrap();
        }

        let drained = store.drain_undelivered(&alice).await.unwrap();
        assert_eq!(drained.len(), 3);
        assert!(drained.windows(2).all(|w| w[0].sent_at <= w[1].sent_at));

        let second = store.drain_undelivered(&alice).await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn undelivered_query_ignores_other_recipients() {
        let (store, _dir) = temp_store();
        let alice = Username::from("alice");
        let bob = Username::from("bob");
        let carol = Username::from("carol");

        store
            .insert_message(Envelope::deposited(bob.clone(), alice.clone(), vec![], vec![]))
            .await
            .unwrap();
        store
            .insert_message(Envelope::deposited(bob, carol.clone(), vec![], vec![]))
            .await
            .unwrap();

        let for_alice = store.get_undelivered_for_recipient(&alice).await.unwrap();
        assert_eq!(for_alice.len(), 1);
        assert_eq!(for_alice[0].recipient, alice);
    }
}
