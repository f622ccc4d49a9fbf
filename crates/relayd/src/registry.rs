//! Owned set of live client connections.
//!
//! The registry is mutated only by the relay task, so it needs no
//! locking. Connections are keyed by a monotonically assigned
//! [`ConnId`]; a `BTreeMap` keeps iteration in insertion order while
//! giving removal by identity without an array splice.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use tokio::net::TcpStream;

use crate::connection::{ClientConnection, ConnId};

/// Insertion-ordered collection of live client sockets.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    clients: BTreeMap<ConnId, ClientConnection>,
    next_id: ConnId,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an upgraded socket and returns its assigned identity.
    pub fn insert(&mut self, stream: TcpStream, peer: SocketAddr) -> ConnId {
        self.next_id += 1;
        let id = self.next_id;
        self.clients
            .insert(id, ClientConnection::new(id, stream, peer));
        id
    }

    /// Removes a connection by identity.
    pub fn remove(&mut self, id: ConnId) -> Option<ClientConnection> {
        self.clients.remove(&id)
    }

    /// Looks up a connection by identity.
    pub fn get(&self, id: ConnId) -> Option<&ClientConnection> {
        self.clients.get(&id)
    }

    /// Mutable lookup by identity.
    pub fn get_mut(&mut self, id: ConnId) -> Option<&mut ClientConnection> {
        self.clients.get_mut(&id)
    }

    /// Snapshot of all identities in insertion order.
    ///
    /// Taken before a sweep so connections can be removed mid-scan.
    pub fn ids(&self) -> Vec<ConnId> {
        self.clients.keys().copied().collect()
    }

    /// Iterates connections in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ClientConnection> {
        self.clients.values()
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// True when no client is registered.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Removes and returns every connection, leaving the registry
    /// empty.
    pub fn drain(&mut self) -> Vec<ClientConnection> {
        let clients = std::mem::take(&mut self.clients);
        clients.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Accepts `count` loopback sockets into the registry and returns
    /// the peer ends alongside it.
    async fn registry_with(count: usize) -> (ConnectionRegistry, Vec<TcpStream>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut registry = ConnectionRegistry::new();
        let mut peers = Vec::with_capacity(count);
        for _ in 0..count {
            let peer = TcpStream::connect(addr).await.unwrap();
            let (accepted, remote) = listener.accept().await.unwrap();
            registry.insert(accepted, remote);
            peers.push(peer);
        }
        (registry, peers)
    }

    #[tokio::test]
    async fn test_ids_are_insertion_ordered() {
        let (registry, _peers) = registry_with(3).await;
        let ids = registry.ids();
        assert_eq!(ids.len(), 3);
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[tokio::test]
    async fn test_remove_by_identity() {
        let (mut registry, _peers) = registry_with(3).await;
        let ids = registry.ids();

        let removed = registry.remove(ids[1]).unwrap();
        assert_eq!(removed.id(), ids[1]);
        assert_eq!(registry.len(), 2);
        assert!(registry.get(ids[1]).is_none());
        assert!(registry.remove(ids[1]).is_none());

        // Remaining order preserved
        assert_eq!(registry.ids(), vec![ids[0], ids[2]]);
    }

    #[tokio::test]
    async fn test_drain_empties_registry() {
        let (mut registry, _peers) = registry_with(2).await;

        let drained = registry.drain();
        assert_eq!(drained.len(), 2);
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }
}
