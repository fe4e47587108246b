//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `TranscriptStore` trait.

use std::path::Path;
use std::sync::Arc;

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options,
};
use toolchat_core::SessionId;

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::transcript::persisted_window;
use crate::types::Message;
use crate::TranscriptStore;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::ColumnFamily(name.to_string()))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

impl TranscriptStore for RocksStore {
    fn load_transcript(&self, session_id: &SessionId) -> Result<Vec<Message>> {
        let cf = self.cf(cf::TRANSCRIPTS)?;
        let key = keys::transcript_key(session_id);

        let messages = self
            .db
            .get_cf(&cf, key)?
            .map(|data| Self::deserialize::<Vec<Message>>(&data))
            .transpose()?
            .unwrap_or_default();

        tracing::debug!(session_id = %session_id, count = messages.len(), "Loaded transcript");
        Ok(messages)
    }

    fn save_transcript(&self, session_id: &SessionId, messages: &[Message]) -> Result<()> {
        let cf = self.cf(cf::TRANSCRIPTS)?;
        let key = keys::transcript_key(session_id);
        let window = persisted_window(messages);
        let value = Self::serialize(&window)?;

        self.db.put_cf(&cf, key, value)?;

        tracing::trace!(session_id = %session_id, count = window.len(), "Saved transcript");
        Ok(())
    }

    fn delete_transcript(&self, session_id: &SessionId) -> Result<()> {
        let cf = self.cf(cf::TRANSCRIPTS)?;
        let key = keys::transcript_key(session_id);

        if self.db.get_cf(&cf, &key)?.is_none() {
            return Err(StoreError::NotFound(*session_id));
        }

        self.db.delete_cf(&cf, &key)?;
        Ok(())
    }

    fn list_sessions(&self) -> Result<Vec<SessionId>> {
        let cf = self.cf(cf::TRANSCRIPTS)?;

        let mut sessions = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, _) = item?;
            match keys::session_id_from_key(&key) {
                Some(session_id) => sessions.push(session_id),
                None => tracing::warn!(len = key.len(), "Skipping malformed transcript key"),
            }
        }

        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Role, ToolCall};
    use tempfile::TempDir;
    use toolchat_core::MessageId;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    #[test]
    fn transcript_roundtrip() {
        let (store, _dir) = create_test_store();
        let session_id = SessionId::generate();

        let call = ToolCall::function(
            "call_1",
            "api_request",
            r#"{"method":"GET","path":"/items"}"#,
        );
        let messages = vec![
            Message::user("list items"),
            Message::tool_call(MessageId::generate(), call)
                .with_display("Tool call: api_request(GET /items)"),
            Message::tool_result("call_1", "Status: 200 OK\n\n[]"),
        ];

        store.save_transcript(&session_id, &messages).unwrap();
        let loaded = store.load_transcript(&session_id).unwrap();

        assert_eq!(loaded, messages);
        assert_eq!(loaded[1].role, Role::Assistant);
        assert!(loaded[1].content.is_none());
    }

    #[test]
    fn load_missing_is_empty() {
        let (store, _dir) = create_test_store();
        let loaded = store.load_transcript(&SessionId::generate()).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn twenty_five_appends_keep_last_twenty() {
        let (store, _dir) = create_test_store();
        let session_id = SessionId::generate();

        // Save after every append, the way a live session does
        let mut messages = Vec::new();
        for i in 0..25 {
            messages.push(Message::user(format!("message {i}")));
            store.save_transcript(&session_id, &messages).unwrap();
        }

        let loaded = store.load_transcript(&session_id).unwrap();
        assert_eq!(loaded.len(), 20);
        assert_eq!(loaded[0].content.as_deref(), Some("message 5"));
        assert_eq!(loaded[19].content.as_deref(), Some("message 24"));
    }

    #[test]
    fn reopen_preserves_transcript() {
        let dir = TempDir::new().unwrap();
        let session_id = SessionId::generate();

        {
            let store = RocksStore::open(dir.path()).unwrap();
            store
                .save_transcript(&session_id, &[Message::user("persist me")])
                .unwrap();
        }

        let store = RocksStore::open(dir.path()).unwrap();
        let loaded = store.load_transcript(&session_id).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].content.as_deref(), Some("persist me"));
    }

    #[test]
    fn delete_and_list() {
        let (store, _dir) = create_test_store();
        let a = SessionId::generate();
        let b = SessionId::generate();
        store.save_transcript(&a, &[Message::user("a")]).unwrap();
        store.save_transcript(&b, &[Message::user("b")]).unwrap();

        let sessions = store.list_sessions().unwrap();
        assert_eq!(sessions.len(), 2);
        assert!(sessions.contains(&a));

        store.delete_transcript(&a).unwrap();
        assert_eq!(store.list_sessions().unwrap(), vec![b]);
        assert!(matches!(
            store.delete_transcript(&a),
            Err(StoreError::NotFound(_))
        ));
    }
}
