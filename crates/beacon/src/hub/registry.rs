//! Registry mapping subscriber identities to their live connections.

use std::sync::Arc;

use dashmap::DashMap;

use super::connection::Connection;

/// The single source of truth for "who is connected".
///
/// All mutation goes through the atomic map operations below; no operation
/// blocks on transport I/O, so a slow client write can never stall registry
/// mutations for other callers.
pub struct ConnectionRegistry {
    connections: DashMap<String, Arc<Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Insert a connection under its identity, returning the connection it
    /// replaced, if any. The caller is responsible for closing the
    /// superseded one.
    pub fn insert(&self, conn: Arc<Connection>) -> Option<Arc<Connection>> {
        self.connections
            .insert(conn.identity().to_string(), conn)
    }

    /// Current connection for `identity`, if any.
    pub fn get(&self, identity: &str) -> Option<Arc<Connection>> {
        self.connections.get(identity).map(|e| e.value().clone())
    }

    /// Remove whatever is registered under `identity`.
    pub fn remove(&self, identity: &str) -> Option<Arc<Connection>> {
        self.connections.remove(identity).map(|(_, conn)| conn)
    }

    /// Remove the entry for `identity` only if it is still exactly `conn`.
    ///
    /// The identity-plus-reference comparison keeps a stale writer (an old
    /// heartbeat task, a dropped stream handle) from evicting a replacement
    /// connection that reconnected under the same identity.
    pub fn remove_if_current(
        &self,
        identity: &str,
        conn: &Arc<Connection>,
    ) -> Option<Arc<Connection>> {
        self.connections
            .remove_if(identity, |_, current| Arc::ptr_eq(current, conn))
            .map(|(_, removed)| removed)
    }

    /// Whether the registry's entry for `identity` is exactly `conn`.
    pub fn is_current(&self, identity: &str, conn: &Arc<Connection>) -> bool {
        self.connections
            .get(identity)
            .map(|e| Arc::ptr_eq(e.value(), conn))
            .unwrap_or(false)
    }

    /// Point-in-time copy of all entries, for iteration without holding any
    /// map lock during delivery.
    pub fn snapshot(&self) -> Vec<(String, Arc<Connection>)> {
        self.connections
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Remove and return every entry. Each connection is returned exactly
    /// once even under concurrent callers.
    pub fn drain(&self) -> Vec<Arc<Connection>> {
        let identities: Vec<String> = self
            .connections
            .iter()
            .map(|e| e.key().clone())
            .collect();
        identities
            .into_iter()
            .filter_map(|identity| self.remove(&identity))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Identities of all currently registered connections.
    pub fn identities(&self) -> Vec<String> {
        self.connections.iter().map(|e| e.key().clone()).collect()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(identity: &str) -> Arc<Connection> {
        Connection::new(identity, 8).0
    }

    #[test]
    fn test_insert_returns_replaced_connection() {
        let registry = ConnectionRegistry::new();
        let first = conn("u1");
        let second = conn("u1");

        assert!(registry.insert(first.clone()).is_none());
        let replaced = registry.insert(second.clone()).unwrap();
        assert!(Arc::ptr_eq(&replaced, &first));
        assert_eq!(registry.len(), 1);
        assert!(registry.is_current("u1", &second));
        assert!(!registry.is_current("u1", &first));
    }

    #[test]
    fn test_remove_if_current_ignores_stale_reference() {
        let registry = ConnectionRegistry::new();
        let stale = conn("u1");
        let current = conn("u1");
        registry.insert(current.clone());

        assert!(registry.remove_if_current("u1", &stale).is_none());
        assert_eq!(registry.len(), 1);

        let removed = registry.remove_if_current("u1", &current).unwrap();
        assert!(Arc::ptr_eq(&removed, &current));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_absent_identity_is_none() {
        let registry = ConnectionRegistry::new();
        assert!(registry.remove("ghost").is_none());
    }

    #[test]
    fn test_snapshot_is_point_in_time() {
        let registry = ConnectionRegistry::new();
        registry.insert(conn("u1"));
        registry.insert(conn("u2"));

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);

        // Mutating after the snapshot does not affect it.
        registry.remove("u1");
        assert_eq!(snapshot.len(), 2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_drain_empties_registry() {
        let registry = ConnectionRegistry::new();
        registry.insert(conn("u1"));
        registry.insert(conn("u2"));

        let drained = registry.drain();
        assert_eq!(drained.len(), 2);
        assert!(registry.is_empty());
        assert!(registry.drain().is_empty());
    }

    #[test]
    fn test_identities_lists_connected() {
        let registry = ConnectionRegistry::new();
        registry.insert(conn("u1"));
        registry.insert(conn("u2"));

        let mut identities = registry.identities();
        identities.sort();
        assert_eq!(identities, vec!["u1".to_string(), "u2".to_string()]);
    }
}
