//! Key encoding utilities for `RocksDB`.

use toolchat_core::SessionId;

/// Length in bytes of a transcript key.
pub const TRANSCRIPT_KEY_LEN: usize = 16;

/// Encode a transcript key (just the session ID bytes).
#[must_use]
pub fn transcript_key(session_id: &SessionId) -> Vec<u8> {
    session_id.as_bytes().to_vec()
}

/// Decode a session ID from a transcript key.
///
/// Returns `None` if the key is not exactly [`TRANSCRIPT_KEY_LEN`] bytes.
#[must_use]
pub fn session_id_from_key(key: &[u8]) -> Option<SessionId> {
    let bytes: [u8; TRANSCRIPT_KEY_LEN] = key.try_into().ok()?;
    Some(SessionId::from_bytes(bytes))
}
