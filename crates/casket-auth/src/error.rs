//! Error types for the ticket lifecycle and authentication chain.
//!
//! Two layers of errors exist:
//!
//! - [`AuthenticationError`] is what a single [`AuthenticationHandler`] reports. It is
//!   always recovered by the [`AuthenticationManager`] and never crashes a request.
//! - [`CasError`] is what the CAS core hands to the protocol layer. Ticket validation
//!   failures carry a precise [`InvalidTicketKind`]; the protocol layer is expected to
//!   collapse them (see [`CasError::protocol_code`]) so external callers cannot use the
//!   response as an oracle for ticket guessing.
//!
//! [`AuthenticationHandler`]: crate::authentication::AuthenticationHandler
//! [`AuthenticationManager`]: crate::authentication::AuthenticationManager

use std::fmt;

use crate::authentication::CredentialType;

/// Why a ticket could not be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvalidTicketKind {
    /// No ticket with this id exists (or it is not of the expected kind).
    NotFound,
    /// The ticket exists but its expiration policy (or an ancestor's) says it is expired.
    Expired,
    /// The service ticket was already redeemed.
    AlreadyConsumed,
    /// The ticket was issued for a different service.
    ServiceMismatch,
}

impl fmt::Display for InvalidTicketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::Expired => write!(f, "expired"),
            Self::AlreadyConsumed => write!(f, "already consumed"),
            Self::ServiceMismatch => write!(f, "service mismatch"),
        }
    }
}

/// Classification of a handler-level authentication failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthenticationErrorKind {
    /// The credential was checked and rejected.
    BadCredentials,
    /// The account exists but is disabled.
    AccountDisabled,
    /// The account exists but has expired.
    AccountExpired,
    /// The account is locked.
    AccountLocked,
    /// The handler could not reach a conclusion (I/O failure, malformed input, timeout).
    HandlerUnavailable,
    /// The credential was accepted but the principal could not be resolved.
    PrincipalResolution,
    /// Multi-round negotiation needs another round trip with the client.
    ContinuationRequired,
}

impl fmt::Display for AuthenticationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::BadCredentials => "bad credentials",
            Self::AccountDisabled => "account disabled",
            Self::AccountExpired => "account expired",
            Self::AccountLocked => "account locked",
            Self::HandlerUnavailable => "handler unavailable",
            Self::PrincipalResolution => "principal resolution failed",
            Self::ContinuationRequired => "continuation required",
        };
        f.write_str(s)
    }
}

/// Failure reported by a single authentication handler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct AuthenticationError {
    kind: AuthenticationErrorKind,
    message: String,
}

impl AuthenticationError {
    /// Creates an error of an arbitrary kind.
    #[must_use]
    pub fn new(kind: AuthenticationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Creates a `BadCredentials` error.
    #[must_use]
    pub fn bad_credentials(message: impl Into<String>) -> Self {
        Self::new(AuthenticationErrorKind::BadCredentials, message)
    }

    /// Creates an `AccountDisabled` error.
    #[must_use]
    pub fn account_disabled(message: impl Into<String>) -> Self {
        Self::new(AuthenticationErrorKind::AccountDisabled, message)
    }

    /// Creates an `AccountExpired` error.
    #[must_use]
    pub fn account_expired(message: impl Into<String>) -> Self {
        Self::new(AuthenticationErrorKind::AccountExpired, message)
    }

    /// Creates a `HandlerUnavailable` error.
    #[must_use]
    pub fn handler_unavailable(message: impl Into<String>) -> Self {
        Self::new(AuthenticationErrorKind::HandlerUnavailable, message)
    }

    /// Creates a `ContinuationRequired` error.
    #[must_use]
    pub fn continuation_required(message: impl Into<String>) -> Self {
        Self::new(AuthenticationErrorKind::ContinuationRequired, message)
    }

    /// Returns the failure classification.
    #[must_use]
    pub fn kind(&self) -> AuthenticationErrorKind {
        self.kind
    }

    /// Returns the human-readable detail.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns `true` if the handler reached a decision about the credential.
    ///
    /// `HandlerUnavailable` is the only inconclusive kind: the credential may well be
    /// valid, the handler just could not tell.
    #[must_use]
    pub fn is_conclusive(&self) -> bool {
        self.kind != AuthenticationErrorKind::HandlerUnavailable
    }
}

/// One handler's failure, as aggregated by the authentication manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    /// Name of the handler that failed.
    pub handler: String,
    /// What the handler reported.
    pub error: AuthenticationError,
}

impl fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.handler, self.error)
    }
}

/// Errors surfaced by the CAS core to the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum CasError {
    /// No configured handler supports the presented credential.
    #[error("Unsupported credential: no handler supports {credential_type} credentials")]
    UnsupportedCredential {
        /// The variant of the rejected credential.
        credential_type: CredentialType,
    },

    /// Every supporting handler failed.
    #[error("Authentication failed: {} handler(s) rejected the credential", .failures.len())]
    AuthenticationFailed {
        /// Individual handler failures in the order they were tried.
        failures: Vec<HandlerFailure>,
    },

    /// A handler could not conclude and the manager is configured to stop on such errors.
    #[error("Authentication handler unavailable: {handler} - {message}")]
    HandlerUnavailable {
        /// The handler name.
        handler: String,
        /// Description of the failure.
        message: String,
    },

    /// A ticket could not be used.
    #[error("Invalid ticket: {kind}")]
    InvalidTicket {
        /// Precise reason, for the protocol layer only.
        kind: InvalidTicketKind,
    },

    /// A generated ticket id collided with an existing one.
    ///
    /// This signals a broken id generator and must never be retried silently.
    #[error("Duplicate ticket id: {id}")]
    DuplicateId {
        /// The (redacted) colliding id.
        id: String,
    },

    /// The service is not registered or is disabled.
    #[error("Unauthorized service: {service}")]
    UnauthorizedService {
        /// The requested service.
        service: String,
    },

    /// The service that owns the ticket may not act as a proxy.
    #[error("Service is not authorized to proxy: {service}")]
    ProxyNotAuthorized {
        /// The service that requested proxy authentication.
        service: String,
    },

    /// The proxy callback handshake failed.
    #[error("Proxy callback failed: {url} - {message}")]
    ProxyCallbackFailed {
        /// The callback URL.
        url: String,
        /// Description of the failure.
        message: String,
    },

    /// A versioned update lost a race and could not be applied.
    #[error("Concurrent update of ticket {id}")]
    ConcurrentUpdate {
        /// The (redacted) ticket id.
        id: String,
    },

    /// The ticket store failed.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// The configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },
}

impl CasError {
    /// Creates a new `InvalidTicket` error.
    #[must_use]
    pub fn invalid_ticket(kind: InvalidTicketKind) -> Self {
        Self::InvalidTicket { kind }
    }

    /// Creates a new `UnsupportedCredential` error.
    #[must_use]
    pub fn unsupported_credential(credential_type: CredentialType) -> Self {
        Self::UnsupportedCredential { credential_type }
    }

    /// Creates a new `HandlerUnavailable` error.
    #[must_use]
    pub fn handler_unavailable(handler: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HandlerUnavailable {
            handler: handler.into(),
            message: message.into(),
        }
    }

    /// Creates a new `UnauthorizedService` error.
    #[must_use]
    pub fn unauthorized_service(service: impl Into<String>) -> Self {
        Self::UnauthorizedService {
            service: service.into(),
        }
    }

    /// Creates a new `ProxyNotAuthorized` error.
    #[must_use]
    pub fn proxy_not_authorized(service: impl Into<String>) -> Self {
        Self::ProxyNotAuthorized {
            service: service.into(),
        }
    }

    /// Creates a new `ProxyCallbackFailed` error.
    #[must_use]
    pub fn proxy_callback_failed(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProxyCallbackFailed {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Returns the ticket failure kind, if this is an `InvalidTicket` error.
    #[must_use]
    pub fn invalid_ticket_kind(&self) -> Option<InvalidTicketKind> {
        match self {
            Self::InvalidTicket { kind } => Some(*kind),
            _ => None,
        }
    }

    /// Returns `true` if the failure was caused by the caller's input.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedCredential { .. }
                | Self::AuthenticationFailed { .. }
                | Self::InvalidTicket { .. }
                | Self::UnauthorizedService { .. }
                | Self::ProxyNotAuthorized { .. }
                | Self::ProxyCallbackFailed { .. }
        )
    }

    /// Returns `true` if the failure is on the server side.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::HandlerUnavailable { .. }
                | Self::DuplicateId { .. }
                | Self::ConcurrentUpdate { .. }
                | Self::Storage { .. }
                | Self::Configuration { .. }
        )
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnsupportedCredential { .. } => ErrorCategory::Authentication,
            Self::AuthenticationFailed { .. } => ErrorCategory::Authentication,
            Self::HandlerUnavailable { .. } => ErrorCategory::Infrastructure,
            Self::InvalidTicket { .. } => ErrorCategory::Ticket,
            Self::DuplicateId { .. } => ErrorCategory::Internal,
            Self::UnauthorizedService { .. } => ErrorCategory::Authorization,
            Self::ProxyNotAuthorized { .. } => ErrorCategory::Authorization,
            Self::ProxyCallbackFailed { .. } => ErrorCategory::Proxy,
            Self::ConcurrentUpdate { .. } => ErrorCategory::Internal,
            Self::Storage { .. } => ErrorCategory::Infrastructure,
            Self::Configuration { .. } => ErrorCategory::Configuration,
        }
    }

    /// Returns the CAS protocol failure code for this error.
    ///
    /// Ticket failures other than a service mismatch all map to `INVALID_TICKET`.
    #[must_use]
    pub fn protocol_code(&self) -> &'static str {
        match self {
            Self::InvalidTicket {
                kind: InvalidTicketKind::ServiceMismatch,
            } => "INVALID_SERVICE",
            Self::InvalidTicket { .. } => "INVALID_TICKET",
            Self::UnsupportedCredential { .. } => "INVALID_REQUEST",
            Self::AuthenticationFailed { .. } => "INVALID_REQUEST",
            Self::UnauthorizedService { .. } => "UNAUTHORIZED_SERVICE",
            Self::ProxyNotAuthorized { .. } => "UNAUTHORIZED_SERVICE_PROXY",
            Self::ProxyCallbackFailed { .. } => "INVALID_PROXY_CALLBACK",
            Self::HandlerUnavailable { .. }
            | Self::DuplicateId { .. }
            | Self::ConcurrentUpdate { .. }
            | Self::Storage { .. }
            | Self::Configuration { .. } => "INTERNAL_ERROR",
        }
    }
}

/// Categories of CAS errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Credential verification errors.
    Authentication,
    /// Service/proxy permission errors.
    Authorization,
    /// Ticket lookup and validation errors.
    Ticket,
    /// Proxy callback errors.
    Proxy,
    /// Storage and external identity source errors.
    Infrastructure,
    /// Configuration errors.
    Configuration,
    /// Invariant violations.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::Authorization => write!(f, "authorization"),
            Self::Ticket => write!(f, "ticket"),
            Self::Proxy => write!(f, "proxy"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CasError::invalid_ticket(InvalidTicketKind::AlreadyConsumed);
        assert_eq!(err.to_string(), "Invalid ticket: already consumed");

        let err = CasError::handler_unavailable("ldap", "connection refused");
        assert_eq!(
            err.to_string(),
            "Authentication handler unavailable: ldap - connection refused"
        );

        let err = CasError::AuthenticationFailed {
            failures: vec![
                HandlerFailure {
                    handler: "a".to_string(),
                    error: AuthenticationError::bad_credentials("nope"),
                },
                HandlerFailure {
                    handler: "b".to_string(),
                    error: AuthenticationError::handler_unavailable("down"),
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "Authentication failed: 2 handler(s) rejected the credential"
        );
    }

    #[test]
    fn test_authentication_error_conclusive() {
        assert!(AuthenticationError::bad_credentials("x").is_conclusive());
        assert!(AuthenticationError::account_disabled("x").is_conclusive());
        assert!(AuthenticationError::continuation_required("x").is_conclusive());
        assert!(!AuthenticationError::handler_unavailable("x").is_conclusive());
        assert_eq!(
            AuthenticationError::account_expired("since yesterday").to_string(),
            "account expired: since yesterday"
        );
    }

    #[test]
    fn test_protocol_codes_collapse_ticket_failures() {
        for kind in [
            InvalidTicketKind::NotFound,
            InvalidTicketKind::Expired,
            InvalidTicketKind::AlreadyConsumed,
        ] {
            assert_eq!(
                CasError::invalid_ticket(kind).protocol_code(),
                "INVALID_TICKET"
            );
        }
        assert_eq!(
            CasError::invalid_ticket(InvalidTicketKind::ServiceMismatch).protocol_code(),
            "INVALID_SERVICE"
        );
        assert_eq!(
            CasError::proxy_not_authorized("https://app").protocol_code(),
            "UNAUTHORIZED_SERVICE_PROXY"
        );
        assert_eq!(CasError::storage("down").protocol_code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_error_predicates() {
        let err = CasError::invalid_ticket(InvalidTicketKind::Expired);
        assert!(err.is_client_error());
        assert!(!err.is_server_error());
        assert_eq!(err.invalid_ticket_kind(), Some(InvalidTicketKind::Expired));

        let err = CasError::DuplicateId {
            id: "ST-1-abc".to_string(),
        };
        assert!(err.is_server_error());
        assert_eq!(err.category(), ErrorCategory::Internal);
        assert_eq!(err.invalid_ticket_kind(), None);
    }

    #[test]
    fn test_error_category_display() {
        assert_eq!(ErrorCategory::Ticket.to_string(), "ticket");
        assert_eq!(ErrorCategory::Proxy.to_string(), "proxy");
        assert_eq!(ErrorCategory::Infrastructure.to_string(), "infrastructure");
    }
}
