//! Ticket storage and lifecycle management.
//!
//! - [`TicketStore`] - Backend-agnostic storage contract with versioned updates
//! - [`InMemoryTicketStore`] - Sharded in-memory store
//! - [`TicketRegistry`] - Lifecycle rules on top of a store: expiry, cascade, consume
//! - [`RegistryCleaner`] - Background expiration sweep

pub mod cleaner;
pub mod memory;
pub mod ticket_registry;

use async_trait::async_trait;

use crate::ticket::{Ticket, TicketId};

pub use cleaner::{CleanerHandle, RegistryCleaner};
pub use memory::InMemoryTicketStore;
pub use ticket_registry::{SweepReport, TicketRegistry};

/// Errors raised by a ticket store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A ticket with this id already exists.
    #[error("Ticket already exists: {0}")]
    Duplicate(String),

    /// The backend failed.
    #[error("Ticket store backend error: {0}")]
    Backend(String),
}

/// Storage contract for tickets.
///
/// Every ticket carries a `version`. [`replace`](Self::replace) is a compare-and-swap
/// on that version, which is how the registry makes read-check-mark sequences atomic
/// per ticket id without any registry-wide lock.
///
/// # Atomicity
///
/// Implementations must guarantee that of two concurrent `replace` calls carrying the
/// same version, at most one succeeds, and that `insert` never overwrites.
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Inserts a new ticket.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Duplicate` if the id is already present.
    async fn insert(&self, ticket: Ticket) -> Result<(), StoreError>;

    /// Returns a snapshot of the ticket, if present.
    async fn get(&self, id: &TicketId) -> Result<Option<Ticket>, StoreError>;

    /// Replaces the stored ticket if its version still equals `ticket.version`.
    ///
    /// On success the stored copy's version is `ticket.version + 1`.
    ///
    /// # Returns
    ///
    /// `true` if the ticket was replaced, `false` if it is absent or was changed
    /// concurrently.
    async fn replace(&self, ticket: Ticket) -> Result<bool, StoreError>;

    /// Removes a ticket, returning it if it was present.
    async fn remove(&self, id: &TicketId) -> Result<Option<Ticket>, StoreError>;

    /// Returns a snapshot of every stored ticket.
    async fn scan(&self) -> Result<Vec<Ticket>, StoreError>;

    /// Returns the number of stored tickets.
    async fn len(&self) -> Result<usize, StoreError>;

    /// Returns `true` if the store is empty.
    async fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len().await? == 0)
    }
}

impl From<StoreError> for crate::error::CasError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(id) => Self::DuplicateId { id },
            StoreError::Backend(message) => Self::Storage { message },
        }
    }
}
