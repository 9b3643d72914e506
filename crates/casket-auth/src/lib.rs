//! # casket-auth
//!
//! Ticket lifecycle and authentication-chain core of the casket single sign-on server.
//!
//! This crate provides:
//! - Ticket-granting, service, proxy-granting and proxy tickets with pluggable
//!   expiration policies
//! - A backend-agnostic ticket registry with atomic consume, cascading destroy and a
//!   background expiration sweep
//! - An ordered, timeout-bounded authentication handler chain
//! - Username/password and SPNEGO handlers
//! - The CAS core operations driven by a protocol layer
//!
//! ## Overview
//!
//! A login turns a [`Credential`] into an [`Authentication`] through the
//! [`AuthenticationManager`], and the [`CentralAuthenticationService`] binds it to a
//! ticket-granting ticket. Services receive single-use service tickets, which they
//! redeem for an [`Assertion`]. Proxy-enabled services may additionally obtain
//! proxy-granting tickets and act on the user's behalf.
//!
//! ## Modules
//!
//! - [`config`] - Ticket, registry and handler-chain configuration
//! - [`error`] - Error taxonomy
//! - [`principal`] - Principals and attribute principal factories
//! - [`authentication`] - Credentials, handlers and the authentication manager
//! - [`ticket`] - Ticket model and expiration policies
//! - [`registry`] - Ticket storage, lifecycle rules and sweeping
//! - [`services`] - Registered services
//! - [`proxy`] - Proxy callback handshake
//! - [`cas`] - The central authentication service

pub mod authentication;
pub mod cas;
pub mod config;
pub mod error;
pub mod principal;
pub mod proxy;
pub mod registry;
pub mod services;
pub mod ticket;

pub use authentication::{
    AcceptUsersAuthenticationHandler, Authentication, AuthenticationHandler,
    AuthenticationManager, Credential, CredentialType, SpnegoAuthenticationHandler,
    SpnegoNegotiator, UserAccount,
};
pub use cas::{Assertion, CentralAuthenticationService, ProxyGrantingTicket};
pub use config::{CasConfig, ConfigError};
pub use error::{
    AuthenticationError, AuthenticationErrorKind, CasError, ErrorCategory, InvalidTicketKind,
};
pub use principal::{
    AttributePrincipal, AttributePrincipalFactory, SimpleAttributePrincipalFactory,
    StaticAttributePrincipalFactory,
};
pub use proxy::{HttpProxyCallbackVerifier, ProxyCallbackVerifier};
pub use registry::{
    CleanerHandle, InMemoryTicketStore, RegistryCleaner, TicketRegistry, TicketStore,
};
pub use services::{RegisteredService, ServicesManager};
pub use ticket::{ExpirationPolicy, Service, Ticket, TicketId, TicketKind};

/// Type alias for CAS core results.
pub type CasResult<T> = Result<T, CasError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use casket_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::CasResult;
    pub use crate::authentication::{
        Authentication, AuthenticationHandler, AuthenticationManager, Credential,
        CredentialType,
    };
    pub use crate::cas::{Assertion, CentralAuthenticationService, ProxyGrantingTicket};
    pub use crate::config::CasConfig;
    pub use crate::error::{AuthenticationError, CasError, InvalidTicketKind};
    pub use crate::principal::{AttributePrincipal, AttributePrincipalFactory};
    pub use crate::registry::{RegistryCleaner, TicketRegistry};
    pub use crate::ticket::{Service, TicketId};
}
