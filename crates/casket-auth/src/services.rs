//! Registered services and the access decisions made from them.
//!
//! With no registrations at all, every service may use SSO and none may proxy.
//! Once anything is registered, only enabled registrations grant access.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CasError;
use crate::ticket::Service;
use crate::CasResult;

/// A service allowed to use this server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredService {
    /// Registration id.
    pub id: u64,

    /// Display name.
    pub name: String,

    /// Regular expression matched against the service URL.
    pub service_pattern: String,

    /// Disabled registrations match but grant nothing.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Whether the service may obtain proxy-granting tickets.
    #[serde(default)]
    pub allowed_to_proxy: bool,

    /// Lower values are matched first.
    #[serde(default)]
    pub evaluation_order: i32,
}

fn default_enabled() -> bool {
    true
}

impl RegisteredService {
    /// Creates an enabled registration that may not proxy.
    #[must_use]
    pub fn new(id: u64, name: impl Into<String>, service_pattern: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            service_pattern: service_pattern.into(),
            enabled: true,
            allowed_to_proxy: false,
            evaluation_order: 0,
        }
    }

    /// Allows the service to proxy.
    #[must_use]
    pub fn with_proxy(mut self, allowed: bool) -> Self {
        self.allowed_to_proxy = allowed;
        self
    }

    /// Compiles the service pattern.
    ///
    /// # Errors
    ///
    /// Returns the regex error if the pattern is invalid.
    pub fn compile(&self) -> Result<Regex, regex::Error> {
        Regex::new(&self.service_pattern)
    }
}

/// Matches services against the registrations.
#[derive(Debug, Clone, Default)]
pub struct ServicesManager {
    services: Vec<(RegisteredService, Regex)>,
}

impl ServicesManager {
    /// Compiles `services`, ordered by evaluation order then id.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if a pattern does not compile.
    pub fn new(services: &[RegisteredService]) -> CasResult<Self> {
        let mut compiled = services
            .iter()
            .map(|service| {
                service.compile().map(|regex| (service.clone(), regex)).map_err(|e| {
                    CasError::configuration(format!(
                        "service '{}' has an invalid pattern: {e}",
                        service.name
                    ))
                })
            })
            .collect::<CasResult<Vec<_>>>()?;
        compiled.sort_by_key(|(service, _)| (service.evaluation_order, service.id));
        Ok(Self { services: compiled })
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Returns the first registration whose pattern matches `service`.
    #[must_use]
    pub fn find(&self, service: &Service) -> Option<&RegisteredService> {
        self.services
            .iter()
            .find(|(_, regex)| regex.is_match(service.id()))
            .map(|(registered, _)| registered)
    }

    /// Checks that `service` may receive service tickets.
    ///
    /// # Errors
    ///
    /// Returns `UnauthorizedService` for unmatched or disabled services.
    pub fn ensure_allowed(&self, service: &Service) -> CasResult<()> {
        if self.is_empty() {
            return Ok(());
        }
        match self.find(service) {
            Some(registered) if registered.enabled => Ok(()),
            _ => Err(CasError::unauthorized_service(service.id())),
        }
    }

    /// Checks that `service` may obtain proxy-granting tickets.
    ///
    /// # Errors
    ///
    /// Returns `ProxyNotAuthorized` unless an enabled registration allows proxying.
    pub fn ensure_proxy_allowed(&self, service: &Service) -> CasResult<()> {
        match self.find(service) {
            Some(registered) if registered.enabled && registered.allowed_to_proxy => Ok(()),
            _ => Err(CasError::proxy_not_authorized(service.id())),
        }
    }
}
