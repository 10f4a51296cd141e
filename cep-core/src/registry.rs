//! Connected-client bookkeeping.

use std::collections::BTreeMap;

use crate::error::EditorError;
use crate::operation::ClientId;

/// A connected client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    pub id: ClientId,
    /// Reserved for cursor tracking; not used by the engine
    pub cursor: u64,
    pub active: bool,
}

/// Clients keyed by id. Ids are handed out in increasing order starting at 0
/// and never reused within one registry; once `ClientId::MAX` has been
/// handed out, further joins are refused.
#[derive(Debug)]
pub struct ClientRegistry {
    clients: BTreeMap<ClientId, Client>,
    next_id: Option<ClientId>,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::starting_at(0)
    }
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose first id is `first_id`.
    pub fn starting_at(first_id: ClientId) -> Self {
        Self {
            clients: BTreeMap::new(),
            next_id: Some(first_id),
        }
    }

    /// Register a new client and return its id.
    pub fn register(&mut self) -> Result<ClientId, EditorError> {
        let id = self.next_id.ok_or(EditorError::ClientIdsExhausted)?;
        self.next_id = id.checked_add(1);
        self.clients.insert(
            id,
            Client {
                id,
                cursor: 0,
                active: true,
            },
        );
        Ok(id)
    }

    pub fn unregister(&mut self, id: ClientId) -> Option<Client> {
        self.clients.remove(&id)
    }

    pub fn get(&self, id: ClientId) -> Option<&Client> {
        self.clients.get(&id)
    }

    pub fn is_connected(&self, id: ClientId) -> bool {
        self.clients.get(&id).is_some_and(|c| c.active)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Ids of all connected clients, ascending.
    pub fn ids(&self) -> Vec<ClientId> {
        self.clients.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_monotonic() {
        let mut registry = ClientRegistry::new();
        let a = registry.register().unwrap();
        let b = registry.register().unwrap();
        registry.unregister(a);
        let c = registry.register().unwrap();

        assert_eq!((a, b, c), (0, 1, 2));
        assert_eq!(registry.ids(), vec![1, 2]);
    }

    #[test]
    fn test_ids_are_not_wrapped() {
        let mut registry = ClientRegistry::starting_at(ClientId::MAX - 1);
        let low = registry.register().unwrap();
        let last = registry.register().unwrap();
        assert_eq!((low, last), (ClientId::MAX - 1, ClientId::MAX));

        // Id 0 would be free, but ids are never reused
        assert_eq!(registry.register(), Err(EditorError::ClientIdsExhausted));
        registry.unregister(low);
        assert_eq!(registry.register(), Err(EditorError::ClientIdsExhausted));
        assert_eq!(registry.ids(), vec![ClientId::MAX]);
    }

    #[test]
    fn test_new_client_defaults() {
        let mut registry = ClientRegistry::new();
        let id = registry.register().unwrap();
        let client = registry.get(id).unwrap();
        assert!(client.active);
        assert_eq!(client.cursor, 0);
        assert!(registry.is_connected(id));
    }

    #[test]
    fn test_unregister() {
        let mut registry = ClientRegistry::new();
        let id = registry.register().unwrap();
        assert_eq!(registry.len(), 1);

        let removed = registry.unregister(id).unwrap();
        assert_eq!(removed.id, id);
        assert!(registry.is_empty());
        assert!(!registry.is_connected(id));
        assert!(registry.unregister(id).is_none());
    }
}
