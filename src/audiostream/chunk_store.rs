use std::collections::BTreeMap;

use dashmap::DashMap;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("session already exists: {0}")]
    SessionExists(String),
}

/// One upload attempt's worth of chunks.
///
/// `completed` records that the client signalled finish; it deliberately does
/// NOT imply every expected chunk is present. Missing chunks can still be
/// re-uploaded after the finish signal, which is what makes the retry
/// protocol work.
#[derive(Debug, Default)]
struct ChunkSession {
    chunks: BTreeMap<u64, Vec<u8>>,
    expected_count: Option<u64>,
    completed: bool,
}

/// In-memory per-session chunk store. Volatile: a process restart loses all
/// open sessions, and clients are expected to restart the upload.
///
/// Each session's state sits behind one map entry, so operations on the same
/// session serialize while unrelated sessions proceed concurrently.
#[derive(Default)]
pub struct ChunkStore {
    sessions: DashMap<String, ChunkSession>,
}

impl ChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new session. Starting an id twice is a conflict; a client that
    /// wants a fresh attempt deletes the session or picks a new id.
    pub fn start_session(&self, session_id: &str) -> Result<(), ChunkError> {
        match self.sessions.entry(session_id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(ChunkError::SessionExists(session_id.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(ChunkSession::default());
                info!("started chunk session {session_id}");
                Ok(())
            }
        }
    }

    /// Store one chunk. Re-storing a sequence number overwrites the previous
    /// payload. No upper bound on `seq` is enforced here.
    pub fn store_chunk(&self, session_id: &str, seq: u64, data: Vec<u8>) -> Result<(), ChunkError> {
        let mut session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| ChunkError::SessionNotFound(session_id.to_string()))?;
        session.chunks.insert(seq, data);
        Ok(())
    }

    /// Record the client's finish signal and the count it committed to.
    /// Does not block on completeness.
    pub fn finish_session(&self, session_id: &str, expected_count: u64) -> Result<(), ChunkError> {
        let mut session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| ChunkError::SessionNotFound(session_id.to_string()))?;
        session.expected_count = Some(expected_count);
        session.completed = true;
        info!("finished chunk session {session_id}, expecting {expected_count} chunks");
        Ok(())
    }

    /// Sequence numbers in `0..expected_count` with no stored chunk, sorted
    /// ascending. Empty until the client has signalled finish: missingness is
    /// undecidable before the client commits to an expected count.
    pub fn missing_chunks(&self, session_id: &str) -> Result<Vec<u64>, ChunkError> {
        let session = self
            .sessions
            .get(session_id)
            .ok_or_else(|| ChunkError::SessionNotFound(session_id.to_string()))?;

        let Some(expected) = session.expected_count.filter(|_| session.completed) else {
            return Ok(Vec::new());
        };

        Ok((0..expected)
            .filter(|seq| !session.chunks.contains_key(seq))
            .collect())
    }

    /// All stored chunks in ascending sequence order. Completeness is the
    /// caller's job; check `missing_chunks` first.
    pub fn all_chunks(&self, session_id: &str) -> Result<Vec<Vec<u8>>, ChunkError> {
        let session = self
            .sessions
            .get(session_id)
            .ok_or_else(|| ChunkError::SessionNotFound(session_id.to_string()))?;
        Ok(session.chunks.values().cloned().collect())
    }

    /// Drop a session and its chunks. No-op when absent.
    pub fn delete_session(&self, session_id: &str) {
        if self.sessions.remove(session_id).is_some() {
            info!("deleted chunk session {session_id}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_come_back_in_sequence_order() {
        let store = ChunkStore::new();
        store.start_session("s").unwrap();
        for seq in [3u64, 0, 4, 1, 2] {
            store.store_chunk("s", seq, vec![seq as u8]).unwrap();
        }

        let chunks = store.all_chunks("s").unwrap();
        assert_eq!(chunks, vec![vec![0], vec![1], vec![2], vec![3], vec![4]]);
    }

    #[test]
    fn missing_is_empty_before_finish() {
        let store = ChunkStore::new();
        store.start_session("s").unwrap();
        store.store_chunk("s", 0, vec![1]).unwrap();
        store.store_chunk("s", 7, vec![2]).unwrap();

        assert_eq!(store.missing_chunks("s").unwrap(), Vec::<u64>::new());
    }

    #[test]
    fn missing_detection_after_finish() {
        let store = ChunkStore::new();
        store.start_session("s").unwrap();
        for seq in [0u64, 1, 3] {
            store.store_chunk("s", seq, vec![0]).unwrap();
        }
        store.finish_session("s", 5).unwrap();

        assert_eq!(store.missing_chunks("s").unwrap(), vec![2, 4]);
    }

    #[test]
    fn restore_overwrites_chunk() {
        let store = ChunkStore::new();
        store.start_session("s").unwrap();
        store.store_chunk("s", 3, vec![1, 1]).unwrap();
        store.store_chunk("s", 3, vec![2, 2]).unwrap();

        store.finish_session("s", 4).unwrap();
        let chunks = store.all_chunks("s").unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], vec![2, 2]);
    }

    #[test]
    fn double_start_is_a_conflict() {
        let store = ChunkStore::new();
        store.start_session("s").unwrap();
        store.store_chunk("s", 0, vec![9]).unwrap();

        assert!(matches!(
            store.start_session("s"),
            Err(ChunkError::SessionExists(_))
        ));
        // The existing session's chunks survived the failed restart.
        assert_eq!(store.all_chunks("s").unwrap().len(), 1);
    }

    #[test]
    fn retry_protocol_round_trip() {
        let store = ChunkStore::new();
        store.start_session("s1").unwrap();
        store.store_chunk("s1", 0, vec![0]).unwrap();
        store.store_chunk("s1", 2, vec![2]).unwrap();
        store.finish_session("s1", 3).unwrap();

        // Server reports the hole; client re-uploads only that chunk.
        assert_eq!(store.missing_chunks("s1").unwrap(), vec![1]);
        store.store_chunk("s1", 1, vec![1]).unwrap();
        assert_eq!(store.missing_chunks("s1").unwrap(), Vec::<u64>::new());

        let chunks = store.all_chunks("s1").unwrap();
        assert_eq!(chunks, vec![vec![0], vec![1], vec![2]]);
    }

    #[test]
    fn unknown_session_errors() {
        let store = ChunkStore::new();
        assert!(matches!(
            store.store_chunk("nope", 0, vec![]),
            Err(ChunkError::SessionNotFound(_))
        ));
        assert!(matches!(
            store.missing_chunks("nope"),
            Err(ChunkError::SessionNotFound(_))
        ));
        // Deleting an absent session is a no-op.
        store.delete_session("nope");
    }
}
