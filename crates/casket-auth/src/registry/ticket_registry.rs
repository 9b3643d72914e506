//! Ticket lifecycle rules on top of a [`TicketStore`].
//!
//! # Expiry
//!
//! A ticket is expired when its own policy says so, or when any ancestor is expired,
//! destroyed or gone. Reads evaluate this every time (nothing is cached) and remove
//! what they find expired, cascading to descendants. [`TicketRegistry::sweep`] applies
//! the same rule proactively.
//!
//! # Concurrency
//!
//! Mutations go through [`TicketRegistry::update_with`], a read-modify-write loop over
//! the store's versioned compare-and-swap. Two racing updates of the same id never
//! both apply; the loser re-reads and re-checks. Destruction first marks the ticket
//! `Destroyed` through the same mechanism, so a grant that links a child afterwards
//! fails instead of attaching to a ticket that is about to vanish.

use std::collections::HashMap;
use std::sync::Arc;

use time::OffsetDateTime;

use super::memory::InMemoryTicketStore;
use super::{StoreError, TicketStore};
use crate::error::{CasError, InvalidTicketKind};
use crate::ticket::{Ticket, TicketId, TicketKind, TicketState};
use crate::CasResult;

/// How often a versioned update is retried before giving up.
const MAX_UPDATE_ATTEMPTS: usize = 32;

/// Outcome of one expiration sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Tickets looked at.
    pub examined: usize,
    /// Tickets removed, descendants included.
    pub removed: usize,
}

/// Ticket registry.
///
/// Cheap to clone; clones share the underlying store.
#[derive(Clone)]
pub struct TicketRegistry {
    store: Arc<dyn TicketStore>,
}

impl TicketRegistry {
    /// Creates a registry over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn TicketStore>) -> Self {
        Self { store }
    }

    /// Creates a registry over a fresh in-memory store.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryTicketStore::new()))
    }

    /// Inserts a new ticket.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateId` if the id is taken. A collision means the id generator is
    /// broken; it is logged at error level and never retried.
    pub async fn add_ticket(&self, ticket: Ticket) -> CasResult<()> {
        let id = ticket.id.redacted();
        let kind = ticket.kind;
        match self.store.insert(ticket).await {
            Ok(()) => {
                tracing::debug!(ticket = %id, %kind, "Ticket added");
                Ok(())
            }
            Err(StoreError::Duplicate(_)) => {
                tracing::error!(ticket = %id, %kind, "Duplicate ticket id generated");
                Err(CasError::DuplicateId { id })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Looks up a ticket of the expected kind.
    ///
    /// Expired tickets are reported as `NotFound` and removed along with their
    /// descendants. Consumed tickets are returned as they are.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTicket { kind: NotFound }` if the ticket is absent, destroyed,
    /// expired or not assignable to `expected`.
    pub async fn get_ticket(&self, id: &TicketId, expected: TicketKind) -> CasResult<Ticket> {
        self.fetch(id, Some(expected))
            .await
            .map_err(|e| match e.invalid_ticket_kind() {
                Some(InvalidTicketKind::Expired) => {
                    CasError::invalid_ticket(InvalidTicketKind::NotFound)
                }
                _ => e,
            })
    }

    /// Looks up a live ticket, reporting expiry precisely.
    ///
    /// `expected = None` accepts any kind.
    pub(crate) async fn fetch(
        &self,
        id: &TicketId,
        expected: Option<TicketKind>,
    ) -> CasResult<Ticket> {
        let not_found = || CasError::invalid_ticket(InvalidTicketKind::NotFound);

        let ticket = self.store.get(id).await?.ok_or_else(not_found)?;
        if let Some(expected) = expected {
            if !ticket.kind.is_assignable_to(expected) {
                return Err(not_found());
            }
        }
        if ticket.state == TicketState::Destroyed {
            return Err(not_found());
        }

        let now = OffsetDateTime::now_utc();
        if self.is_expired(&ticket, now).await? {
            tracing::debug!(ticket = %id.redacted(), "Ticket expired on read");
            self.delete_ticket(id).await?;
            return Err(CasError::invalid_ticket(InvalidTicketKind::Expired));
        }
        Ok(ticket)
    }

    /// Persists a mutated ticket.
    ///
    /// # Errors
    ///
    /// Returns `ConcurrentUpdate` if the ticket changed since it was read, and
    /// `InvalidTicket { kind: NotFound }` if it is gone.
    pub async fn update_ticket(&self, ticket: Ticket) -> CasResult<()> {
        let id = ticket.id.clone();
        if self.store.replace(ticket).await? {
            return Ok(());
        }
        match self.store.get(&id).await? {
            Some(_) => Err(CasError::ConcurrentUpdate { id: id.redacted() }),
            None => Err(CasError::invalid_ticket(InvalidTicketKind::NotFound)),
        }
    }

    /// Applies `update` to a live ticket atomically.
    ///
    /// The closure sees a fresh snapshot and the current time. If it returns an error
    /// nothing is written. If another writer got in first, the ticket is re-read
    /// (including the expiry check) and the closure runs again.
    ///
    /// # Errors
    ///
    /// Whatever [`fetch`](Self::fetch) or the closure returns, or `ConcurrentUpdate`
    /// after repeated conflicts.
    pub async fn update_with<T, F>(
        &self,
        id: &TicketId,
        expected: Option<TicketKind>,
        mut update: F,
    ) -> CasResult<T>
    where
        F: FnMut(&mut Ticket, OffsetDateTime) -> CasResult<T> + Send,
        T: Send,
    {
        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let mut ticket = self.fetch(id, expected).await?;
            let value = update(&mut ticket, OffsetDateTime::now_utc())?;
            if self.store.replace(ticket).await? {
                return Ok(value);
            }
            tokio::task::yield_now().await;
        }
        tracing::warn!(ticket = %id.redacted(), "Gave up on contended ticket update");
        Err(CasError::ConcurrentUpdate { id: id.redacted() })
    }

    /// Destroys a ticket and every descendant.
    ///
    /// Returns the number of tickets removed; an absent id removes nothing and is not
    /// an error.
    pub async fn delete_ticket(&self, id: &TicketId) -> CasResult<usize> {
        let Some(parent) = self.mark_destroyed(id).await? else {
            return Ok(0);
        };

        let mut removed = 0;
        let mut pending = vec![id.clone()];
        while let Some(current) = pending.pop() {
            if let Some(ticket) = self.store.remove(&current).await? {
                removed += 1;
                pending.extend(ticket.children);
            }
        }

        if let Some(parent) = parent {
            self.unlink_child(&parent, id).await?;
        }

        if removed > 0 {
            tracing::debug!(ticket = %id.redacted(), removed, "Ticket destroyed");
        }
        Ok(removed)
    }

    /// Marks a ticket `Destroyed`.
    ///
    /// Returns `None` if the ticket is absent, otherwise its parent link.
    async fn mark_destroyed(&self, id: &TicketId) -> CasResult<Option<Option<TicketId>>> {
        loop {
            let Some(mut ticket) = self.store.get(id).await? else {
                return Ok(None);
            };
            let parent = ticket.parent.clone();
            if ticket.state == TicketState::Destroyed {
                return Ok(Some(parent));
            }
            ticket.state = TicketState::Destroyed;
            if self.store.replace(ticket).await? {
                return Ok(Some(parent));
            }
            tokio::task::yield_now().await;
        }
    }

    /// Removes `child` from `parent`'s children, if the parent still exists.
    async fn unlink_child(&self, parent: &TicketId, child: &TicketId) -> CasResult<()> {
        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let Some(mut ticket) = self.store.get(parent).await? else {
                return Ok(());
            };
            if !ticket.children.remove(child) {
                return Ok(());
            }
            if self.store.replace(ticket).await? {
                return Ok(());
            }
            tokio::task::yield_now().await;
        }
        Err(CasError::ConcurrentUpdate {
            id: parent.redacted(),
        })
    }

    /// Returns `true` if `ticket` or any of its ancestors is expired, destroyed or gone.
    async fn is_expired(&self, ticket: &Ticket, now: OffsetDateTime) -> CasResult<bool> {
        if ticket.is_expired_at(now) {
            return Ok(true);
        }
        let mut next = ticket.parent.clone();
        while let Some(parent_id) = next {
            match self.store.get(&parent_id).await? {
                Some(parent) if is_live(&parent, now) => next = parent.parent,
                _ => return Ok(true),
            }
        }
        Ok(false)
    }

    /// Removes every expired ticket.
    ///
    /// Safe to run concurrently with foreground traffic: it only removes, and removal
    /// of an id that is already gone counts as nothing.
    pub async fn sweep(&self) -> CasResult<SweepReport> {
        let tickets = self.store.scan().await?;
        let now = OffsetDateTime::now_utc();
        let by_id: HashMap<&TicketId, &Ticket> = tickets.iter().map(|t| (&t.id, t)).collect();

        let mut report = SweepReport {
            examined: tickets.len(),
            removed: 0,
        };
        for ticket in &tickets {
            if ticket.state == TicketState::Destroyed || chain_expired(ticket, now, &by_id) {
                report.removed += self.delete_ticket(&ticket.id).await?;
            }
        }

        if report.removed > 0 {
            tracing::info!(
                examined = report.examined,
                removed = report.removed,
                "Expired tickets swept"
            );
        }
        Ok(report)
    }

    /// Returns the number of stored tickets, including ones not yet found expired.
    pub async fn len(&self) -> CasResult<usize> {
        Ok(self.store.len().await?)
    }

    /// Returns `true` if no tickets are stored.
    pub async fn is_empty(&self) -> CasResult<bool> {
        Ok(self.store.is_empty().await?)
    }
}

fn is_live(ticket: &Ticket, now: OffsetDateTime) -> bool {
    ticket.state != TicketState::Destroyed && !ticket.is_expired_at(now)
}

/// Snapshot variant of [`TicketRegistry::is_expired`].
fn chain_expired(ticket: &Ticket, now: OffsetDateTime, by_id: &HashMap<&TicketId, &Ticket>) -> bool {
    if ticket.is_expired_at(now) {
        return true;
    }
    let mut next = ticket.parent.as_ref();
    while let Some(parent_id) = next {
        match by_id.get(parent_id) {
            Some(parent) if is_live(parent, now) => next = parent.parent.as_ref(),
            _ => return true,
        }
    }
    false
}
