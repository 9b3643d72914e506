//! Authentication handler chain.
//!
//! - [`credential`] - Credential variants
//! - [`handler`] - The [`AuthenticationHandler`] contract
//! - [`manager`] - [`AuthenticationManager`], which runs the chain
//! - [`accept_users`] - Username/password handler over in-memory accounts
//! - [`password`] - Argon2 password hashing helpers
//! - [`spnego`] - SPNEGO handler delegating to an external negotiator

pub mod accept_users;
pub mod credential;
pub mod handler;
pub mod manager;
pub mod password;
pub mod spnego;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::principal::AttributePrincipal;

pub use accept_users::{AcceptUsersAuthenticationHandler, UserAccount};
pub use credential::{
    Credential, CredentialType, SpnegoCredential, UsernamePasswordCredential, X509Credential,
};
pub use handler::AuthenticationHandler;
pub use manager::AuthenticationManager;
pub use spnego::{NegotiationError, NegotiationOutcome, SpnegoAuthenticationHandler, SpnegoNegotiator};

/// Attribute recording which handler authenticated the principal.
pub const AUTHENTICATION_METHOD_ATTRIBUTE: &str = "authenticationMethod";

/// The result of a successful authentication.
///
/// Bound to a ticket-granting ticket and shared by every ticket issued from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authentication {
    principal: AttributePrincipal,
    #[serde(with = "time::serde::rfc3339")]
    authenticated_at: OffsetDateTime,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attributes: BTreeMap<String, Value>,
}

impl Authentication {
    /// Records a successful authentication by `handler`.
    #[must_use]
    pub fn new(principal: AttributePrincipal, handler: &str, authenticated_at: OffsetDateTime) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert(
            AUTHENTICATION_METHOD_ATTRIBUTE.to_string(),
            Value::String(handler.to_string()),
        );
        Self {
            principal,
            authenticated_at,
            attributes,
        }
    }

    /// Returns the authenticated principal.
    #[must_use]
    pub fn principal(&self) -> &AttributePrincipal {
        &self.principal
    }

    /// Returns when the authentication happened.
    #[must_use]
    pub fn authenticated_at(&self) -> OffsetDateTime {
        self.authenticated_at
    }

    /// Returns authentication metadata.
    #[must_use]
    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    /// Returns the name of the handler that succeeded.
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        self.attributes
            .get(AUTHENTICATION_METHOD_ATTRIBUTE)
            .and_then(Value::as_str)
    }
}
