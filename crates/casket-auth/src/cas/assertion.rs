//! Validation results.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::authentication::Authentication;
use crate::principal::AttributePrincipal;
use crate::ticket::{Service, Ticket, TicketId};

/// What a successful ticket validation proves to the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assertion {
    authentication: Authentication,
    service: Service,
    from_new_login: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    proxies: Vec<Url>,
}

impl Assertion {
    pub(crate) fn from_ticket(ticket: &Ticket, service: Service) -> Self {
        Self {
            authentication: ticket.authentication.clone(),
            service,
            from_new_login: ticket.from_new_login,
            proxies: ticket.proxied_by.clone(),
        }
    }

    /// Returns the authenticated principal.
    #[must_use]
    pub fn principal(&self) -> &AttributePrincipal {
        self.authentication.principal()
    }

    /// Returns the authentication the ticket descends from.
    #[must_use]
    pub fn authentication(&self) -> &Authentication {
        &self.authentication
    }

    /// Returns the service the ticket was validated for.
    #[must_use]
    pub fn service(&self) -> &Service {
        &self.service
    }

    /// Returns `true` if the ticket was issued right after the user logged in.
    #[must_use]
    pub fn is_from_new_login(&self) -> bool {
        self.from_new_login
    }

    /// Returns the proxy chain, most recent proxy first. Empty for direct access.
    #[must_use]
    pub fn proxies(&self) -> &[Url] {
        &self.proxies
    }
}

/// A freshly issued proxy-granting ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyGrantingTicket {
    /// The proxy-granting ticket id, delivered only to the callback.
    pub pgt_id: TicketId,
    /// The IOU the validation response carries in place of the id.
    pub pgt_iou: TicketId,
}
