//! In-memory storage implementation.
//!
//! Used by tests and by ephemeral sessions that should leave nothing on disk.

use std::collections::HashMap;

use parking_lot::RwLock;
use toolchat_core::SessionId;

use crate::error::{Result, StoreError};
use crate::transcript::persisted_window;
use crate::types::Message;
use crate::TranscriptStore;

/// `HashMap`-backed transcript store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    transcripts: RwLock<HashMap<SessionId, Vec<Message>>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TranscriptStore for MemoryStore {
    fn load_transcript(&self, session_id: &SessionId) -> Result<Vec<Message>> {
        Ok(self
            .transcripts
            .read()
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }

    fn save_transcript(&self, session_id: &SessionId, messages: &[Message]) -> Result<()> {
        self.transcripts
            .write()
            .insert(*session_id, persisted_window(messages).to_vec());
        Ok(())
    }

    fn delete_transcript(&self, session_id: &SessionId) -> Result<()> {
        self.transcripts
            .write()
            .remove(session_id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(*session_id))
    }

    fn list_sessions(&self) -> Result<Vec<SessionId>> {
        Ok(self.transcripts.read().keys().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_is_empty() {
        let store = MemoryStore::new();
        assert!(store
            .load_transcript(&SessionId::generate())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn save_truncates() {
        let store = MemoryStore::new();
        let session_id = SessionId::generate();
        let messages: Vec<Message> = (0..25).map(|i| Message::user(format!("m{i}"))).collect();

        store.save_transcript(&session_id, &messages).unwrap();

        let loaded = store.load_transcript(&session_id).unwrap();
        assert_eq!(loaded.len(), 20);
        assert_eq!(loaded[0].content.as_deref(), Some("m5"));
    }

    #[test]
    fn delete_missing_is_not_found() {
        let store = MemoryStore::new();
        let result = store.delete_transcript(&SessionId::generate());
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }
}
