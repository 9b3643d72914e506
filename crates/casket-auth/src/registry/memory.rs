//! In-memory ticket store backed by a sharded concurrent map.
//!
//! Each operation locks only the shard that holds the id, so unrelated tickets never
//! contend.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::{StoreError, TicketStore};
use crate::ticket::{Ticket, TicketId};

/// In-memory [`TicketStore`].
#[derive(Debug, Default)]
pub struct InMemoryTicketStore {
    tickets: DashMap<TicketId, Ticket>,
}

impl InMemoryTicketStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TicketStore for InMemoryTicketStore {
    async fn insert(&self, ticket: Ticket) -> Result<(), StoreError> {
        match self.tickets.entry(ticket.id.clone()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(ticket.id.redacted())),
            Entry::Vacant(slot) => {
                slot.insert(ticket);
                Ok(())
            }
        }
    }

    async fn get(&self, id: &TicketId) -> Result<Option<Ticket>, StoreError> {
        Ok(self.tickets.get(id).map(|entry| entry.value().clone()))
    }

    async fn replace(&self, mut ticket: Ticket) -> Result<bool, StoreError> {
        let Some(mut stored) = self.tickets.get_mut(&ticket.id) else {
            return Ok(false);
        };
        if stored.version != ticket.version {
            return Ok(false);
        }
        ticket.version += 1;
        *stored = ticket;
        Ok(true)
    }

    async fn remove(&self, id: &TicketId) -> Result<Option<Ticket>, StoreError> {
        Ok(self.tickets.remove(id).map(|(_, ticket)| ticket))
    }

    async fn scan(&self) -> Result<Vec<Ticket>, StoreError> {
        Ok(self
            .tickets
            .iter()
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.tickets.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authentication::Authentication;
    use crate::principal::AttributePrincipal;
    use crate::ticket::ExpirationPolicy;
    use time::OffsetDateTime;

    fn ticket(id: &str) -> Ticket {
        let now = OffsetDateTime::now_utc();
        Ticket::ticket_granting(
            TicketId::new(id),
            Authentication::new(AttributePrincipal::new("alice"), "test", now),
            ExpirationPolicy::Never,
            now,
        )
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicates() {
        let store = InMemoryTicketStore::new();
        store.insert(ticket("TGT-1-a")).await.unwrap();
        let err = store.insert(ticket("TGT-1-a")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_replace_is_versioned() {
        let store = InMemoryTicketStore::new();
        store.insert(ticket("TGT-1-a")).await.unwrap();

        let first = store.get(&"TGT-1-a".into()).await.unwrap().unwrap();
        let mut stale = first.clone();

        let mut updated = first;
        updated.use_count = 1;
        assert!(store.replace(updated).await.unwrap());

        stale.use_count = 99;
        assert!(!store.replace(stale).await.unwrap());

        let stored = store.get(&"TGT-1-a".into()).await.unwrap().unwrap();
        assert_eq!(stored.use_count, 1);
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn test_replace_absent_ticket() {
        let store = InMemoryTicketStore::new();
        assert!(!store.replace(ticket("TGT-9-z")).await.unwrap());
        assert!(store.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let store = InMemoryTicketStore::new();
        store.insert(ticket("TGT-1-a")).await.unwrap();
        assert!(store.remove(&"TGT-1-a".into()).await.unwrap().is_some());
        assert!(store.remove(&"TGT-1-a".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_scan() {
        let store = InMemoryTicketStore::new();
        store.insert(ticket("TGT-1-a")).await.unwrap();
        store.insert(ticket("TGT-2-b")).await.unwrap();
        let mut ids: Vec<String> = store
            .scan()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id.to_string())
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["TGT-1-a", "TGT-2-b"]);
    }
}
