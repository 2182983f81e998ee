//! Connection registry: at most one live connection per user.
//!
//! Admission replaces and returns the previous entry so the caller can
//! close it explicitly. Removal is conditional on connection identity, so
//! the close path of a superseded socket cannot evict its successor.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::domain::foundation::UserId;

use super::connection::Connection;

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: RwLock<HashMap<UserId, Arc<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `connection` for its user, returning the displaced entry.
    pub async fn admit(&self, connection: Arc<Connection>) -> Option<Arc<Connection>> {
        let user_id = connection.user_id().clone();
        let previous = self.entries.write().await.insert(user_id, connection.clone());
        previous.filter(|prev| prev.id() != connection.id())
    }

    /// Removes the entry for the connection's user if it still is `connection`.
    pub async fn remove(&self, connection: &Connection) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get(connection.user_id()) {
            Some(current) if current.id() == connection.id() => {
                entries.remove(connection.user_id());
                true
            }
            _ => false,
        }
    }

    pub async fn lookup(&self, user_id: &UserId) -> Option<Arc<Connection>> {
        self.entries.read().await.get(user_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Point-in-time copy for timers; the map lock is released on return.
    ///
    /// Entries filed under a user other than their connection's are evicted.
    pub async fn snapshot(&self) -> Vec<Arc<Connection>> {
        let mut entries = self.entries.write().await;
        entries.retain(|user_id, conn| {
            let consistent = conn.user_id() == user_id;
            if !consistent {
                tracing::error!(
                    registered_as = %user_id,
                    user_id = %conn.user_id(),
                    connection_id = %conn.id(),
                    "Evicting registry entry filed under the wrong user"
                );
            }
            consistent
        });
        entries.values().cloned().collect()
    }

    #[cfg(test)]
    async fn insert_raw(&self, user_id: UserId, connection: Arc<Connection>) {
        self.entries.write().await.insert(user_id, connection);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn conn(user: &str) -> Arc<Connection> {
        let (connection, _rx) = Connection::new(UserId::new(user).unwrap());
        Arc::new(connection)
    }

    #[tokio::test]
    async fn admit_returns_displaced_connection() {
        let registry = ConnectionRegistry::new();
        let first = conn("alice");
        let second = conn("alice");

        assert!(registry.admit(first.clone()).await.is_none());
        let evicted = registry.admit(second.clone()).await.unwrap();

        assert_eq!(evicted.id(), first.id());
        assert_eq!(registry.len().await, 1);
        assert_eq!(
            registry.lookup(&UserId::new("alice").unwrap()).await.unwrap().id(),
            second.id()
        );
    }

    #[tokio::test]
    async fn stale_remove_keeps_successor() {
        let registry = ConnectionRegistry::new();
        let first = conn("alice");
        let second = conn("alice");
        registry.admit(first.clone()).await;
        registry.admit(second.clone()).await;

        assert!(!registry.remove(&first).await);
        assert_eq!(registry.len().await, 1);
        assert!(registry.remove(&second).await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn readmitting_same_connection_displaces_nothing() {
        let registry = ConnectionRegistry::new();
        let first = conn("alice");
        registry.admit(first.clone()).await;
        assert!(registry.admit(first).await.is_none());
    }

    #[tokio::test]
    async fn snapshot_evicts_entries_under_wrong_user() {
        let registry = ConnectionRegistry::new();
        let alice = conn("alice");
        registry.admit(alice.clone()).await;
        registry.insert_raw(UserId::new("mallory").unwrap(), conn("bob")).await;

        let live = registry.snapshot().await;

        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id(), alice.id());
        assert!(registry.lookup(&UserId::new("mallory").unwrap()).await.is_none());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Admit(usize),
        RemoveLatest(usize),
        RemoveOldest(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..3usize).prop_map(Op::Admit),
            (0..3usize).prop_map(Op::RemoveLatest),
            (0..3usize).prop_map(Op::RemoveOldest),
        ]
    }

    proptest! {
        #[test]
        fn at_most_one_entry_per_user(ops in prop::collection::vec(op(), 1..40)) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            runtime.block_on(async {
                let users = ["u0", "u1", "u2"];
                let registry = ConnectionRegistry::new();
                let mut admitted: Vec<Vec<Arc<Connection>>> = vec![Vec::new(); users.len()];
                let mut expected: Vec<Option<Arc<Connection>>> = vec![None; users.len()];

                for op in ops {
                    match op {
                        Op::Admit(u) => {
                            let c = conn(users[u]);
                            let evicted = registry.admit(c.clone()).await;
                            prop_assert_eq!(
                                evicted.map(|e| e.id()),
                                expected[u].as_ref().map(|e| e.id())
                            );
                            admitted[u].push(c.clone());
                            expected[u] = Some(c);
                        }
                        Op::RemoveLatest(u) | Op::RemoveOldest(u) => {
                            let pick = match op {
                                Op::RemoveLatest(_) => admitted[u].last().cloned(),
                                _ => admitted[u].first().cloned(),
                            };
                            if let Some(c) = pick {
                                let removed = registry.remove(&c).await;
                                let was_current = expected[u].as_ref().map(|e| e.id()) == Some(c.id());
                                prop_assert_eq!(removed, was_current);
                                if was_current {
                                    expected[u] = None;
                                }
                            }
                        }
                    }

                    let live = expected.iter().filter(|e| e.is_some()).count();
                    prop_assert_eq!(registry.len().await, live);
                    for (u, user) in users.iter().enumerate() {
                        let found = registry.lookup(&UserId::new(*user).unwrap()).await;
                        prop_assert_eq!(
                            found.map(|c| c.id()),
                            expected[u].as_ref().map(|c| c.id())
                        );
                    }
                }
                Ok(())
            })?;
        }
    }
}
