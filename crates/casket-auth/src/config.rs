//! Ticket, registry and authentication-chain configuration.
//!
//! Every section defaults sensibly, so an empty document is a valid configuration.
//! Durations use humantime notation (`"10s"`, `"30m"`, `"2h"`).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::services::RegisteredService;
use crate::ticket::ExpirationPolicy;

/// Root configuration for the CAS core.
///
/// # Example (TOML)
///
/// ```toml
/// [tickets.ticket_granting]
/// time_to_live = "8h"
/// time_to_idle = "2h"
///
/// [tickets.service]
/// time_to_live = "10s"
///
/// [registry]
/// sweep_interval = "2m"
///
/// [[services]]
/// id = 1
/// name = "portal"
/// service_pattern = "^https://portal\\.example\\.org/.*"
/// allowed_to_proxy = true
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CasConfig {
    /// Ticket lifetimes and id generation.
    pub tickets: TicketConfig,

    /// Ticket registry housekeeping.
    pub registry: RegistryConfig,

    /// Authentication manager behaviour.
    pub authentication: AuthenticationConfig,

    /// Proxy authentication.
    pub proxy: ProxyConfig,

    /// SPNEGO handler options.
    pub spnego: SpnegoConfig,

    /// Registered services. Empty means every service may use SSO and none may proxy.
    pub services: Vec<RegisteredService>,
}

/// Ticket lifetimes.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TicketConfig {
    /// Ticket-granting (and proxy-granting) ticket policy.
    pub ticket_granting: TicketGrantingConfig,

    /// Service ticket policy.
    pub service: ServiceTicketConfig,

    /// Proxy ticket policy.
    pub proxy: ServiceTicketConfig,

    /// Optional node suffix appended to every generated ticket id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_suffix: Option<String>,
}

/// Ticket-granting ticket lifetime: absolute cap, idle cap and optional use cap,
/// whichever is hit first.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TicketGrantingConfig {
    /// Absolute lifetime from login.
    #[serde(with = "humantime_serde")]
    pub time_to_live: Duration,

    /// Maximum time between uses.
    #[serde(with = "humantime_serde")]
    pub time_to_idle: Duration,

    /// Maximum number of service tickets granted from one session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_uses: Option<u32>,
}

impl Default for TicketGrantingConfig {
    fn default() -> Self {
        Self {
            time_to_live: Duration::from_secs(2 * 3600),
            time_to_idle: Duration::from_secs(30 * 60),
            max_uses: None,
        }
    }
}

impl TicketGrantingConfig {
    /// Builds the expiration policy described by this section.
    #[must_use]
    pub fn expiration_policy(&self) -> ExpirationPolicy {
        ExpirationPolicy::MultiTimeUseOrTimeout {
            max_uses: self.max_uses,
            time_to_live: Some(self.time_to_live),
            time_to_idle: Some(self.time_to_idle),
        }
    }
}

/// Service (or proxy) ticket lifetime.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceTicketConfig {
    /// Absolute lifetime from issuance.
    #[serde(with = "humantime_serde")]
    pub time_to_live: Duration,
}

impl Default for ServiceTicketConfig {
    fn default() -> Self {
        Self {
            time_to_live: Duration::from_secs(10),
        }
    }
}

impl ServiceTicketConfig {
    /// Builds the expiration policy described by this section.
    #[must_use]
    pub fn expiration_policy(&self) -> ExpirationPolicy {
        ExpirationPolicy::Timeout {
            time_to_live: self.time_to_live,
        }
    }
}

/// Background expiration sweep.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Run the periodic sweep.
    pub sweep_enabled: bool,

    /// Interval between sweeps. Independent of any ticket policy.
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,

    /// Delay before the first sweep after startup.
    #[serde(with = "humantime_serde")]
    pub sweep_initial_delay: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            sweep_enabled: true,
            sweep_interval: Duration::from_secs(120),
            sweep_initial_delay: Duration::from_secs(15),
        }
    }
}

/// Authentication manager behaviour.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthenticationConfig {
    /// Upper bound for a single handler invocation.
    /// Expiry is reported as a `HandlerUnavailable` failure.
    #[serde(with = "humantime_serde")]
    pub handler_timeout: Duration,

    /// Keep trying later handlers after an inconclusive (`HandlerUnavailable`) failure.
    pub continue_on_error: bool,
}

impl Default for AuthenticationConfig {
    fn default() -> Self {
        Self {
            handler_timeout: Duration::from_secs(5),
            continue_on_error: true,
        }
    }
}

/// Proxy authentication options.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Allow proxy-granting tickets at all.
    pub enabled: bool,

    /// Upper bound for the callback handshake.
    #[serde(with = "humantime_serde")]
    pub callback_timeout: Duration,

    /// Refuse callback URLs that are not `https`.
    pub require_https: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            callback_timeout: Duration::from_secs(5),
            require_https: true,
        }
    }
}

/// SPNEGO handler options.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SpnegoConfig {
    /// Keep the `DOMAIN\` prefix or `@REALM` suffix in principal names.
    pub principal_with_domain_name: bool,

    /// Accept NTLM tokens in addition to Kerberos.
    pub ntlm_allowed: bool,
}

impl Default for SpnegoConfig {
    fn default() -> Self {
        Self {
            principal_with_domain_name: false,
            ntlm_allowed: true,
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// The configuration document could not be read.
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration document could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

impl CasConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for malformed documents and
    /// `ConfigError::InvalidValue` when [`validate`](Self::validate) fails.
    pub fn from_toml_str(document: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(document)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` if the file cannot be read, otherwise as
    /// [`from_toml_str`](Self::from_toml_str).
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let document = std::fs::read_to_string(path)?;
        Self::from_toml_str(&document)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - The service ticket, proxy ticket or TGT lifetime is zero
    /// - The sweep is enabled with a zero interval
    /// - The handler or proxy callback timeout is zero
    /// - A registered service pattern is not a valid regular expression
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tickets.ticket_granting.time_to_live.is_zero() {
            return Err(ConfigError::InvalidValue(
                "tickets.ticket_granting.time_to_live must be > 0".to_string(),
            ));
        }

        if self.tickets.service.time_to_live.is_zero() {
            return Err(ConfigError::InvalidValue(
                "tickets.service.time_to_live must be > 0".to_string(),
            ));
        }

        if self.tickets.proxy.time_to_live.is_zero() {
            return Err(ConfigError::InvalidValue(
                "tickets.proxy.time_to_live must be > 0".to_string(),
            ));
        }

        if self.tickets.ticket_granting.max_uses == Some(0) {
            return Err(ConfigError::InvalidValue(
                "tickets.ticket_granting.max_uses must be > 0 when set".to_string(),
            ));
        }

        if let Some(suffix) = &self.tickets.id_suffix {
            if suffix.is_empty() || suffix.chars().any(char::is_whitespace) {
                return Err(ConfigError::InvalidValue(
                    "tickets.id_suffix must be non-empty and contain no whitespace".to_string(),
                ));
            }
        }

        if self.registry.sweep_enabled && self.registry.sweep_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "registry.sweep_interval must be > 0".to_string(),
            ));
        }

        if self.authentication.handler_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "authentication.handler_timeout must be > 0".to_string(),
            ));
        }

        if self.proxy.enabled && self.proxy.callback_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "proxy.callback_timeout must be > 0".to_string(),
            ));
        }

        for service in &self.services {
            service
                .compile()
                .map_err(|e| ConfigError::InvalidValue(e.to_string()))?;
        }

        Ok(())
    }
}
