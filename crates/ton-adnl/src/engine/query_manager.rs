//! Pending-query table.
//!
//! Each in-flight query owns a oneshot sender keyed by its 32-byte id, plus
//! the packet that carried it so the query can be resent after a reconnect.
//! Every entry leaves the table exactly once: completed, failed or removed.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::error::{AdnlError, Result};
use crate::protocol::QueryId;

/// Receiver side of a registered query.
pub type QueryReceiver = oneshot::Receiver<Result<Vec<u8>>>;

#[derive(Debug)]
struct PendingQuery {
    packet: Vec<u8>,
    answer_tx: oneshot::Sender<Result<Vec<u8>>>,
}

/// Thread-safe table of pending queries.
#[derive(Debug, Default)]
pub struct QueryManager {
    pending: Mutex<HashMap<QueryId, PendingQuery>>,
}

impl QueryManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<QueryId, PendingQuery>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a query and returns the receiver for its outcome.
    ///
    /// Re-registering an id replaces the previous entry, which then
    /// resolves as closed.
    pub fn register(&self, query_id: QueryId, packet: Vec<u8>) -> QueryReceiver {
        let (answer_tx, answer_rx) = oneshot::channel();
        self.table()
            .insert(query_id, PendingQuery { packet, answer_tx });
        answer_rx
    }

    /// Resolves a query. Returns `false` for an unknown id.
    pub fn complete(&self, query_id: &QueryId, result: Result<Vec<u8>>) -> bool {
        match self.table().remove(query_id) {
            Some(pending) => {
                let _ = pending.answer_tx.send(result);
                true
            }
            None => false,
        }
    }

    pub fn fail(&self, query_id: &QueryId, err: AdnlError) -> bool {
        self.complete(query_id, Err(err))
    }

    /// Fails every pending query; returns how many there were.
    pub fn fail_all(&self, err: AdnlError) -> usize {
        let drained: Vec<_> = self.table().drain().collect();
        let count = drained.len();
        for (_, pending) in drained {
            let _ = pending.answer_tx.send(Err(err.clone()));
        }
        count
    }

    /// Drops a query without resolving it, e.g. after its timeout.
    pub fn remove(&self, query_id: &QueryId) -> bool {
        self.table().remove(query_id).is_some()
    }

    pub fn contains(&self, query_id: &QueryId) -> bool {
        self.table().contains_key(query_id)
    }

    /// Packets of all pending queries, for resending.
    pub fn pending_packets(&self) -> Vec<Vec<u8>> {
        self.table()
            .values()
            .map(|pending| pending.packet.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }
}

/// Removes its query from the table when dropped, unless disarmed.
///
/// Guards a caller that stops waiting early, such as a cancelled future.
pub(crate) struct PendingGuard<'a> {
    queries: &'a QueryManager,
    query_id: QueryId,
    armed: bool,
}

impl<'a> PendingGuard<'a> {
    pub(crate) fn new(queries: &'a QueryManager, query_id: QueryId) -> Self {
        Self {
            queries,
            query_id,
            armed: true,
        }
    }

    pub(crate) fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.queries.remove(&self.query_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_complete_out_of_order() {
        let manager = QueryManager::new();
        let rx1 = manager.register([1u8; 32], b"one".to_vec());
        let rx2 = manager.register([2u8; 32], b"two".to_vec());
        assert_eq!(manager.len(), 2);

        assert!(manager.complete(&[2u8; 32], Ok(b"second".to_vec())));
        assert!(manager.complete(&[1u8; 32], Ok(b"first".to_vec())));
        assert!(manager.is_empty());

        assert_eq!(rx1.await.unwrap().unwrap(), b"first");
        assert_eq!(rx2.await.unwrap().unwrap(), b"second");
    }

    #[test]
    fn test_unknown_and_duplicate_completion() {
        let manager = QueryManager::new();
        assert!(!manager.complete(&[9u8; 32], Ok(Vec::new())));

        let _rx = manager.register([3u8; 32], Vec::new());
        assert!(manager.complete(&[3u8; 32], Ok(Vec::new())));
        assert!(!manager.complete(&[3u8; 32], Ok(Vec::new())));
    }

    #[tokio::test]
    async fn test_fail_all() {
        let manager = QueryManager::new();
        let receivers: Vec<_> = (0..3u8)
            .map(|i| manager.register([i; 32], vec![i]))
            .collect();

        let mut packets = manager.pending_packets();
        packets.sort();
        assert_eq!(packets, vec![vec![0], vec![1], vec![2]]);

        assert_eq!(manager.fail_all(AdnlError::ConnectionClosed), 3);
        assert!(manager.is_empty());
        for rx in receivers {
            assert!(matches!(rx.await.unwrap(), Err(AdnlError::ConnectionClosed)));
        }
    }

    #[tokio::test]
    async fn test_remove_drops_sender() {
        let manager = QueryManager::new();
        let rx = manager.register([5u8; 32], Vec::new());
        assert!(manager.remove(&[5u8; 32]));
        assert!(!manager.remove(&[5u8; 32]));
        assert!(rx.await.is_err());
    }

    #[test]
    fn test_guard_releases_slot() {
        let manager = QueryManager::new();
        let _rx = manager.register([7u8; 32], Vec::new());
        {
            let _guard = PendingGuard::new(&manager, [7u8; 32]);
        }
        assert!(!manager.contains(&[7u8; 32]));

        let _rx = manager.register([8u8; 32], Vec::new());
        {
            let mut guard = PendingGuard::new(&manager, [8u8; 32]);
            guard.disarm();
        }
        assert!(manager.contains(&[8u8; 32]));
    }
}
