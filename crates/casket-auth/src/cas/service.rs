//! The central authentication service.
//!
//! Per login session the tickets move through:
//!
//! ```text
//! anonymous ──login──▶ TGT issued ──grant──▶ ST issued ──validate──▶ validated
//!                          │                                            │
//!                          │                            (proxy-enabled) ▼
//!                          │                                     PGT issued ──grant──▶ PT
//!                          └───────────────logout / expiry──────────────▶ destroyed
//! ```
//!
//! Every operation returns a precise [`CasError`]; the protocol layer decides how much
//! of it to reveal (see [`CasError::protocol_code`]).

use std::sync::Arc;

use time::OffsetDateTime;
use url::Url;

use super::assertion::{Assertion, ProxyGrantingTicket};
use crate::authentication::{AuthenticationManager, Credential};
use crate::config::{CasConfig, ProxyConfig};
use crate::error::{CasError, InvalidTicketKind};
use crate::proxy::{HttpProxyCallbackVerifier, ProxyCallbackVerifier};
use crate::registry::TicketRegistry;
use crate::services::ServicesManager;
use crate::ticket::{
    ExpirationPolicy, PGT_IOU_PREFIX, Service, Ticket, TicketId, TicketIdGenerator, TicketKind,
    TicketState,
};
use crate::CasResult;

/// Result of redeeming a service or proxy ticket.
enum Redemption {
    Valid(Assertion),
    WrongService(Service),
}

/// Orchestrates authentication, ticket issuance, validation and logout.
pub struct CentralAuthenticationService {
    registry: TicketRegistry,
    authentication_manager: AuthenticationManager,
    services: ServicesManager,
    proxy_verifier: Arc<dyn ProxyCallbackVerifier>,
    id_generator: TicketIdGenerator,
    ticket_granting_policy: ExpirationPolicy,
    service_ticket_policy: ExpirationPolicy,
    proxy_ticket_policy: ExpirationPolicy,
    proxy: ProxyConfig,
}

impl CentralAuthenticationService {
    /// Creates the service from configuration.
    ///
    /// Proxy callbacks are verified over HTTP unless replaced with
    /// [`with_proxy_callback_verifier`](Self::with_proxy_callback_verifier).
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if a service pattern is invalid or the HTTP client
    /// cannot be built.
    pub fn new(
        config: &CasConfig,
        registry: TicketRegistry,
        authentication_manager: AuthenticationManager,
    ) -> CasResult<Self> {
        Ok(Self {
            registry,
            authentication_manager,
            services: ServicesManager::new(&config.services)?,
            proxy_verifier: Arc::new(HttpProxyCallbackVerifier::new(&config.proxy)?),
            id_generator: TicketIdGenerator::new(config.tickets.id_suffix.clone()),
            ticket_granting_policy: config.tickets.ticket_granting.expiration_policy(),
            service_ticket_policy: config.tickets.service.expiration_policy(),
            proxy_ticket_policy: config.tickets.proxy.expiration_policy(),
            proxy: config.proxy.clone(),
        })
    }

    /// Replaces the proxy callback verifier.
    #[must_use]
    pub fn with_proxy_callback_verifier(mut self, verifier: Arc<dyn ProxyCallbackVerifier>) -> Self {
        self.proxy_verifier = verifier;
        self
    }

    /// Returns the ticket registry.
    #[must_use]
    pub fn registry(&self) -> &TicketRegistry {
        &self.registry
    }

    /// Authenticates `credential` and opens an SSO session.
    ///
    /// The ticket is only created once authentication has fully succeeded, so an
    /// abandoned call leaves nothing behind.
    ///
    /// # Errors
    ///
    /// Returns the authentication manager's error on failure, or `DuplicateId` if the
    /// id generator collided.
    pub async fn create_ticket_granting_ticket(
        &self,
        credential: &mut Credential,
    ) -> CasResult<TicketId> {
        let authentication = self.authentication_manager.authenticate(credential).await?;
        let principal = authentication.principal().name().to_string();

        let ticket = Ticket::ticket_granting(
            self.id_generator.generate(TicketKind::TicketGranting.prefix()),
            authentication,
            self.ticket_granting_policy.clone(),
            OffsetDateTime::now_utc(),
        );
        let id = ticket.id.clone();
        self.registry.add_ticket(ticket).await?;

        tracing::info!(ticket = %id.redacted(), %principal, "Ticket-granting ticket created");
        Ok(id)
    }

    /// Issues a service ticket for `service` from an SSO session.
    ///
    /// # Errors
    ///
    /// - `UnauthorizedService` if the service is not registered
    /// - `InvalidTicket` if the ticket-granting ticket is absent, expired or destroyed
    pub async fn grant_service_ticket(
        &self,
        tgt_id: &TicketId,
        service: &Service,
    ) -> CasResult<TicketId> {
        self.services.ensure_allowed(service)?;
        self.grant_child(
            tgt_id,
            TicketKind::TicketGranting,
            service,
            &self.service_ticket_policy,
        )
        .await
    }

    /// Issues a proxy ticket for `service` from a proxy-granting ticket.
    ///
    /// # Errors
    ///
    /// As [`grant_service_ticket`](Self::grant_service_ticket).
    pub async fn grant_proxy_ticket(
        &self,
        pgt_id: &TicketId,
        service: &Service,
    ) -> CasResult<TicketId> {
        self.services.ensure_allowed(service)?;
        self.grant_child(
            pgt_id,
            TicketKind::ProxyGranting,
            service,
            &self.proxy_ticket_policy,
        )
        .await
    }

    /// Links a new child into `parent_id` and inserts it.
    ///
    /// Linking happens first, through a versioned update that fails once the parent is
    /// destroyed. If the parent disappears between linking and insertion the child is
    /// removed again.
    async fn grant_child(
        &self,
        parent_id: &TicketId,
        parent_kind: TicketKind,
        service: &Service,
        policy: &ExpirationPolicy,
    ) -> CasResult<TicketId> {
        let child_kind = match parent_kind {
            TicketKind::ProxyGranting => TicketKind::Proxy,
            _ => TicketKind::Service,
        };
        let child_id = self.id_generator.generate(child_kind.prefix());

        let link = child_id.clone();
        let parent = self
            .registry
            .update_with(parent_id, Some(TicketKind::TicketGranting), move |ticket, now| {
                if ticket.kind != parent_kind {
                    return Err(CasError::invalid_ticket(InvalidTicketKind::NotFound));
                }
                if ticket.expiration_policy.is_exhausted(&ticket.usage()) {
                    return Err(CasError::invalid_ticket(InvalidTicketKind::Expired));
                }
                ticket.record_use(now);
                ticket.children.insert(link.clone());
                Ok(ticket.clone())
            })
            .await
            .inspect_err(|e| {
                tracing::debug!(ticket = %parent_id.redacted(), error = %e, "Ticket grant refused");
            })?;

        let child = Ticket::granted_by(
            child_id.clone(),
            &parent,
            service.clone(),
            policy.clone(),
            OffsetDateTime::now_utc(),
        );
        self.registry.add_ticket(child).await?;

        if let Err(e) = self.registry.fetch(parent_id, None).await {
            self.registry.delete_ticket(&child_id).await?;
            return Err(e);
        }

        tracing::info!(
            ticket = %child_id.redacted(),
            parent = %parent_id.redacted(),
            %service,
            "Ticket granted"
        );
        Ok(child_id)
    }

    /// Redeems a service ticket for `service`.
    ///
    /// A ticket can be redeemed once. Presenting it for a different service also uses
    /// it up, so a leaked ticket cannot be retried against the right service.
    ///
    /// # Errors
    ///
    /// `InvalidTicket` with kind `NotFound`, `Expired`, `AlreadyConsumed` or
    /// `ServiceMismatch`. No principal is returned on any failure.
    pub async fn validate_service_ticket(
        &self,
        st_id: &TicketId,
        service: &Service,
    ) -> CasResult<Assertion> {
        self.redeem(st_id, service, false).await
    }

    /// Redeems a service or proxy ticket for `service`.
    ///
    /// The assertion lists the proxies the ticket passed through.
    ///
    /// # Errors
    ///
    /// As [`validate_service_ticket`](Self::validate_service_ticket).
    pub async fn validate_proxy_ticket(
        &self,
        ticket_id: &TicketId,
        service: &Service,
    ) -> CasResult<Assertion> {
        self.redeem(ticket_id, service, true).await
    }

    async fn redeem(
        &self,
        ticket_id: &TicketId,
        service: &Service,
        accept_proxy_tickets: bool,
    ) -> CasResult<Assertion> {
        let outcome = self
            .registry
            .update_with(ticket_id, Some(TicketKind::Service), |ticket, now| {
                if ticket.kind == TicketKind::Proxy && !accept_proxy_tickets {
                    return Err(CasError::invalid_ticket(InvalidTicketKind::NotFound));
                }
                if ticket.state == TicketState::Consumed {
                    return Err(CasError::invalid_ticket(InvalidTicketKind::AlreadyConsumed));
                }
                ticket.state = TicketState::Consumed;
                ticket.record_use(now);
                match &ticket.service {
                    Some(issued_for) if issued_for == service => {
                        ticket.validated = true;
                        Ok(Redemption::Valid(Assertion::from_ticket(ticket, service.clone())))
                    }
                    Some(issued_for) => Ok(Redemption::WrongService(issued_for.clone())),
                    None => Ok(Redemption::WrongService(Service::new(""))),
                }
            })
            .await;

        match outcome {
            Ok(Redemption::Valid(assertion)) => {
                tracing::info!(
                    ticket = %ticket_id.redacted(),
                    principal = assertion.principal().name(),
                    %service,
                    "Ticket validated"
                );
                Ok(assertion)
            }
            Ok(Redemption::WrongService(issued_for)) => {
                tracing::warn!(
                    ticket = %ticket_id.redacted(),
                    %issued_for,
                    presented = %service,
                    "Ticket presented for the wrong service"
                );
                Err(CasError::invalid_ticket(InvalidTicketKind::ServiceMismatch))
            }
            Err(e) => {
                tracing::debug!(ticket = %ticket_id.redacted(), error = %e, "Ticket validation failed");
                Err(e)
            }
        }
    }

    /// Issues a proxy-granting ticket to the service that owns `st_id`.
    ///
    /// The service ticket must already have been validated by the service it was
    /// issued for, and that service must be registered with `allowed_to_proxy`. The
    /// new ticket is only stored after `callback_url` has received it, and a service
    /// ticket yields at most one proxy-granting ticket.
    ///
    /// # Errors
    ///
    /// - `ProxyNotAuthorized` if proxying is disabled or the service may not proxy
    /// - `ProxyCallbackFailed` if the URL is invalid or the handshake fails
    /// - `InvalidTicket` if the service ticket is unusable: `NotFound` if it was never
    ///   validated, `ServiceMismatch` if it was burned by a wrong-service validation,
    ///   `AlreadyConsumed` if it already produced a proxy-granting ticket
    pub async fn create_proxy_granting_ticket(
        &self,
        st_id: &TicketId,
        callback_url: &str,
    ) -> CasResult<ProxyGrantingTicket> {
        let service_ticket = self.registry.fetch(st_id, Some(TicketKind::Service)).await?;
        let service = service_ticket
            .service
            .clone()
            .ok_or_else(|| CasError::invalid_ticket(InvalidTicketKind::NotFound))?;

        if !self.proxy.enabled {
            return Err(CasError::proxy_not_authorized(service.id()));
        }
        self.services.ensure_proxy_allowed(&service)?;
        if !service_ticket.validated {
            let kind = match service_ticket.state {
                TicketState::Consumed => InvalidTicketKind::ServiceMismatch,
                _ => InvalidTicketKind::NotFound,
            };
            tracing::warn!(
                ticket = %st_id.redacted(),
                %service,
                "Proxy-granting ticket requested with an unvalidated ticket"
            );
            return Err(CasError::invalid_ticket(kind));
        }
        if service_ticket.proxy_granted {
            return Err(CasError::invalid_ticket(InvalidTicketKind::AlreadyConsumed));
        }

        let callback = Url::parse(callback_url)
            .map_err(|e| CasError::proxy_callback_failed(callback_url, e.to_string()))?;
        let pgt_id = self
            .id_generator
            .generate(TicketKind::ProxyGranting.prefix());
        let pgt_iou = self.id_generator.generate(PGT_IOU_PREFIX);

        match tokio::time::timeout(
            self.proxy.callback_timeout,
            self.proxy_verifier.verify(&callback, &pgt_id, &pgt_iou),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(callback = %callback, error = %e, "Proxy callback handshake failed");
                return Err(CasError::proxy_callback_failed(callback.as_str(), e.to_string()));
            }
            Err(_) => {
                tracing::warn!(callback = %callback, "Proxy callback handshake timed out");
                return Err(CasError::proxy_callback_failed(
                    callback.as_str(),
                    format!("no answer within {:?}", self.proxy.callback_timeout),
                ));
            }
        }

        let service_ticket = self
            .registry
            .update_with(st_id, Some(TicketKind::Service), |ticket, _| {
                if ticket.proxy_granted {
                    return Err(CasError::invalid_ticket(InvalidTicketKind::AlreadyConsumed));
                }
                ticket.proxy_granted = true;
                Ok(ticket.clone())
            })
            .await?;
        let parent_id = service_ticket
            .parent
            .clone()
            .ok_or_else(|| CasError::invalid_ticket(InvalidTicketKind::NotFound))?;

        let link = pgt_id.clone();
        self.registry
            .update_with(&parent_id, Some(TicketKind::TicketGranting), move |ticket, _| {
                ticket.children.insert(link.clone());
                Ok(())
            })
            .await?;

        let pgt = Ticket::proxy_granting(
            pgt_id.clone(),
            &service_ticket,
            callback,
            self.ticket_granting_policy.clone(),
            OffsetDateTime::now_utc(),
        );
        self.registry.add_ticket(pgt).await?;

        if let Err(e) = self.registry.fetch(&parent_id, None).await {
            self.registry.delete_ticket(&pgt_id).await?;
            return Err(e);
        }

        tracing::info!(
            ticket = %pgt_id.redacted(),
            parent = %parent_id.redacted(),
            %service,
            "Proxy-granting ticket created"
        );
        Ok(ProxyGrantingTicket { pgt_id, pgt_iou })
    }

    /// Ends an SSO session, destroying every ticket issued from it.
    ///
    /// Returns the number of tickets removed. Unknown, expired or already destroyed
    /// sessions remove nothing and are not an error.
    pub async fn destroy_ticket_granting_ticket(&self, tgt_id: &TicketId) -> CasResult<usize> {
        match self
            .registry
            .fetch(tgt_id, Some(TicketKind::TicketGranting))
            .await
        {
            Ok(_) => {}
            Err(CasError::InvalidTicket { .. }) => return Ok(0),
            Err(e) => return Err(e),
        }

        let removed = self.registry.delete_ticket(tgt_id).await?;
        tracing::info!(ticket = %tgt_id.redacted(), removed, "Ticket-granting ticket destroyed");
        Ok(removed)
    }
}
