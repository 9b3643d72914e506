//! Ticket records.
//!
//! Tickets form a forest: ticket-granting tickets are roots, service and proxy tickets
//! are leaves, and proxy-granting tickets sit in between. Links are stored as ids in
//! both directions. The parent link is non-owning; the children set is what cascading
//! deletion walks.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;

use super::expiration::{ExpirationPolicy, TicketUsage};
use super::id::TicketId;
use crate::authentication::Authentication;
use crate::principal::AttributePrincipal;

/// The kind of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketKind {
    /// Long-lived SSO session ticket.
    TicketGranting,
    /// Ticket a proxying service uses to obtain proxy tickets.
    ProxyGranting,
    /// Single-use ticket for one service.
    Service,
    /// Single-use ticket for one service, obtained through a proxy.
    Proxy,
}

impl TicketKind {
    /// Returns the id prefix for this kind.
    #[must_use]
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::TicketGranting => "TGT",
            Self::ProxyGranting => "PGT",
            Self::Service => "ST",
            Self::Proxy => "PT",
        }
    }

    /// Returns `true` for kinds that can grant child tickets.
    #[must_use]
    pub fn is_granting(&self) -> bool {
        matches!(self, Self::TicketGranting | Self::ProxyGranting)
    }

    /// Returns `true` if a ticket of this kind may be used where `expected` is asked for.
    ///
    /// A proxy-granting ticket is a kind of ticket-granting ticket, and a proxy ticket is
    /// a kind of service ticket.
    #[must_use]
    pub fn is_assignable_to(&self, expected: TicketKind) -> bool {
        *self == expected
            || matches!(
                (self, expected),
                (Self::ProxyGranting, Self::TicketGranting) | (Self::Proxy, Self::Service)
            )
    }
}

impl fmt::Display for TicketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Stored lifecycle state.
///
/// Expiry is derived from the policy at read time and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketState {
    /// Usable.
    Active,
    /// A single-use ticket that has been redeemed.
    Consumed,
    /// Revoked; removal is in progress.
    Destroyed,
}

/// Observed lifecycle state at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketStatus {
    /// Usable.
    Active,
    /// The ticket's own policy says it is expired.
    Expired,
    /// Redeemed.
    Consumed,
    /// Revoked.
    Destroyed,
}

/// A service a ticket is issued for, identified by its URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Service {
    id: String,
}

impl Service {
    /// Creates a service from its identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Returns the service identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// A ticket record as held by the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    /// Unique id.
    pub id: TicketId,
    /// Ticket kind.
    pub kind: TicketKind,
    /// Stored lifecycle state.
    pub state: TicketState,
    /// Creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Time of the last use.
    #[serde(with = "time::serde::rfc3339")]
    pub last_used_at: OffsetDateTime,
    /// Number of uses.
    pub use_count: u32,
    /// The authentication this ticket descends from.
    pub authentication: Authentication,
    /// When this ticket stops being usable on its own.
    pub expiration_policy: ExpirationPolicy,
    /// The granting ticket (non-owning).
    pub parent: Option<TicketId>,
    /// Tickets granted from this one.
    pub children: BTreeSet<TicketId>,
    /// Target service (service and proxy tickets).
    pub service: Option<Service>,
    /// Whether this ticket was issued right after a fresh login.
    pub from_new_login: bool,
    /// Whether this service or proxy ticket was redeemed by the service it was issued
    /// for. A ticket burned by a service mismatch is consumed but not validated.
    #[serde(default)]
    pub validated: bool,
    /// The callback this proxy-granting ticket was delivered to.
    pub proxy_callback_url: Option<Url>,
    /// Proxy chain, most recent proxy first.
    pub proxied_by: Vec<Url>,
    /// Whether a proxy-granting ticket was already issued from this service ticket.
    pub proxy_granted: bool,
    /// Optimistic concurrency version, maintained by the store.
    pub version: u64,
}

impl Ticket {
    /// Creates a ticket-granting ticket for a fresh authentication.
    #[must_use]
    pub fn ticket_granting(
        id: TicketId,
        authentication: Authentication,
        expiration_policy: ExpirationPolicy,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            id,
            kind: TicketKind::TicketGranting,
            state: TicketState::Active,
            created_at: now,
            last_used_at: now,
            use_count: 0,
            authentication,
            expiration_policy,
            parent: None,
            children: BTreeSet::new(),
            service: None,
            from_new_login: false,
            validated: false,
            proxy_callback_url: None,
            proxied_by: Vec::new(),
            proxy_granted: false,
            version: 0,
        }
    }

    /// Creates a service ticket (or, under a proxy-granting ticket, a proxy ticket)
    /// granted by `parent`.
    ///
    /// `parent` is expected to reflect the grant already (its use count bumped).
    #[must_use]
    pub fn granted_by(
        id: TicketId,
        parent: &Ticket,
        service: Service,
        expiration_policy: ExpirationPolicy,
        now: OffsetDateTime,
    ) -> Self {
        let kind = match parent.kind {
            TicketKind::ProxyGranting => TicketKind::Proxy,
            _ => TicketKind::Service,
        };
        Self {
            id,
            kind,
            state: TicketState::Active,
            created_at: now,
            last_used_at: now,
            use_count: 0,
            authentication: parent.authentication.clone(),
            expiration_policy,
            parent: Some(parent.id.clone()),
            children: BTreeSet::new(),
            service: Some(service),
            from_new_login: parent.use_count <= 1 && parent.kind == TicketKind::TicketGranting,
            validated: false,
            proxy_callback_url: None,
            proxied_by: parent.proxied_by.clone(),
            proxy_granted: false,
            version: 0,
        }
    }

    /// Creates a proxy-granting ticket from a validated service or proxy ticket.
    ///
    /// The new ticket hangs off the same granting ticket as `service_ticket` and
    /// prepends `callback` to the proxy chain.
    #[must_use]
    pub fn proxy_granting(
        id: TicketId,
        service_ticket: &Ticket,
        callback: Url,
        expiration_policy: ExpirationPolicy,
        now: OffsetDateTime,
    ) -> Self {
        let mut proxied_by = Vec::with_capacity(service_ticket.proxied_by.len() + 1);
        proxied_by.push(callback.clone());
        proxied_by.extend(service_ticket.proxied_by.iter().cloned());
        Self {
            id,
            kind: TicketKind::ProxyGranting,
            state: TicketState::Active,
            created_at: now,
            last_used_at: now,
            use_count: 0,
            authentication: service_ticket.authentication.clone(),
            expiration_policy,
            parent: service_ticket.parent.clone(),
            children: BTreeSet::new(),
            service: service_ticket.service.clone(),
            from_new_login: false,
            validated: false,
            proxy_callback_url: Some(callback),
            proxied_by,
            proxy_granted: false,
            version: 0,
        }
    }

    /// Returns the authenticated principal.
    #[must_use]
    pub fn principal(&self) -> &AttributePrincipal {
        self.authentication.principal()
    }

    /// Returns the facts the expiration policy looks at.
    #[must_use]
    pub fn usage(&self) -> TicketUsage {
        TicketUsage {
            created_at: self.created_at,
            last_used_at: self.last_used_at,
            use_count: self.use_count,
        }
    }

    /// Returns `true` if this ticket's own policy says it is expired.
    ///
    /// Ancestors are not considered; see the registry for that.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expiration_policy.is_expired(&self.usage(), now)
    }

    /// Returns the observed state at `now`.
    #[must_use]
    pub fn status(&self, now: OffsetDateTime) -> TicketStatus {
        match self.state {
            TicketState::Destroyed => TicketStatus::Destroyed,
            TicketState::Consumed => TicketStatus::Consumed,
            TicketState::Active if self.is_expired_at(now) => TicketStatus::Expired,
            TicketState::Active => TicketStatus::Active,
        }
    }

    /// Records a use.
    pub fn record_use(&mut self, now: OffsetDateTime) {
        self.use_count = self.use_count.saturating_add(1);
        self.last_used_at = now;
    }
}
