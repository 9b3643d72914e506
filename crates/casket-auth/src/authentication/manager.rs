//! Authentication manager.
//!
//! Runs the configured handler chain against a credential:
//!
//! 1. Looks up the handlers registered for the credential's variant and keeps those
//!    whose `supports` accepts it. None left means `UnsupportedCredential`.
//! 2. Tries them in registration order. The first success wins.
//! 3. Every invocation is bounded by `handler_timeout`; a timeout counts as
//!    `HandlerUnavailable`. Inconclusive failures either stop the chain or are recorded
//!    and skipped, depending on `continue_on_error`.
//! 4. A handler asking for another negotiation round ends the chain, so the
//!    continuation token it wrote back into the credential reaches the caller intact.
//! 5. If nothing succeeds, all failures are returned together.
//!
//! The manager never constructs principals itself and never touches the ticket
//! registry, so abandoning an in-flight `authenticate` future leaves nothing behind.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;

use super::credential::{Credential, CredentialType};
use super::handler::AuthenticationHandler;
use super::Authentication;
use crate::config::AuthenticationConfig;
use crate::error::{AuthenticationError, AuthenticationErrorKind, CasError, HandlerFailure};
use crate::CasResult;

/// Orchestrates the authentication handler chain.
pub struct AuthenticationManager {
    /// Handlers indexed by the credential variant they serve, in registration order.
    handlers: HashMap<CredentialType, Vec<Arc<dyn AuthenticationHandler>>>,

    /// Upper bound for a single handler invocation.
    handler_timeout: Duration,

    /// Continue past inconclusive failures.
    continue_on_error: bool,
}

impl AuthenticationManager {
    /// Creates a manager with no handlers.
    #[must_use]
    pub fn new(config: &AuthenticationConfig) -> Self {
        Self {
            handlers: HashMap::new(),
            handler_timeout: config.handler_timeout,
            continue_on_error: config.continue_on_error,
        }
    }

    /// Appends a handler to the chain for its credential variant.
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn AuthenticationHandler>) -> Self {
        self.handlers
            .entry(handler.credential_type())
            .or_default()
            .push(handler);
        self
    }

    /// Returns the number of registered handlers.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }

    /// Authenticates `credential`.
    ///
    /// # Errors
    ///
    /// - `UnsupportedCredential` if no handler supports the credential
    /// - `HandlerUnavailable` if a handler could not conclude and `continue_on_error`
    ///   is disabled
    /// - `AuthenticationFailed` with every handler's failure if none succeeded, or
    ///   immediately once a handler requires another negotiation round
    pub async fn authenticate(&self, credential: &mut Credential) -> CasResult<Authentication> {
        let credential_type = credential.credential_type();
        let candidates: Vec<Arc<dyn AuthenticationHandler>> = self
            .handlers
            .get(&credential_type)
            .into_iter()
            .flatten()
            .filter(|handler| handler.supports(credential))
            .cloned()
            .collect();

        if candidates.is_empty() {
            tracing::warn!(credential_type = %credential_type, "No handler supports credential");
            return Err(CasError::unsupported_credential(credential_type));
        }

        let mut failures = Vec::new();
        for handler in candidates {
            let result =
                match tokio::time::timeout(self.handler_timeout, handler.authenticate(credential))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(AuthenticationError::handler_unavailable(format!(
                        "no answer within {:?}",
                        self.handler_timeout
                    ))),
                };

            match result {
                Ok(principal) => {
                    tracing::info!(
                        handler = handler.name(),
                        principal = principal.name(),
                        "Authentication succeeded"
                    );
                    return Ok(Authentication::new(
                        principal,
                        handler.name(),
                        OffsetDateTime::now_utc(),
                    ));
                }
                Err(error) if !error.is_conclusive() => {
                    tracing::warn!(handler = handler.name(), error = %error, "Authentication handler unavailable");
                    if !self.continue_on_error {
                        return Err(CasError::handler_unavailable(
                            handler.name(),
                            error.message(),
                        ));
                    }
                    failures.push(HandlerFailure {
                        handler: handler.name().to_string(),
                        error,
                    });
                }
                Err(error) if error.kind() == AuthenticationErrorKind::ContinuationRequired => {
                    tracing::debug!(handler = handler.name(), "Authentication handler requires another round");
                    failures.push(HandlerFailure {
                        handler: handler.name().to_string(),
                        error,
                    });
                    return Err(CasError::AuthenticationFailed { failures });
                }
                Err(error) => {
                    tracing::debug!(handler = handler.name(), error = %error, "Authentication handler rejected credential");
                    failures.push(HandlerFailure {
                        handler: handler.name().to_string(),
                        error,
                    });
                }
            }
        }

        Err(CasError::AuthenticationFailed { failures })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authentication::X509Credential;
    use crate::principal::AttributePrincipal;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Handler with a scripted outcome that counts its invocations.
    struct ScriptedHandler {
        name: &'static str,
        outcome: Result<&'static str, AuthenticationError>,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    impl ScriptedHandler {
        fn accepting(name: &'static str, principal: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                outcome: Ok(principal),
                delay: None,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(name: &'static str, error: AuthenticationError) -> Arc<Self> {
            Arc::new(Self {
                name,
                outcome: Err(error),
                delay: None,
                calls: AtomicUsize::new(0),
            })
        }

        fn slow(name: &'static str, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                name,
                outcome: Ok("late"),
                delay: Some(delay),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AuthenticationHandler for ScriptedHandler {
        fn name(&self) -> &str {
            self.name
        }

        fn credential_type(&self) -> CredentialType {
            CredentialType::UsernamePassword
        }

        async fn authenticate(
            &self,
            _credential: &mut Credential,
        ) -> Result<AttributePrincipal, AuthenticationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.outcome.clone().map(AttributePrincipal::new)
        }
    }

    fn config(continue_on_error: bool) -> AuthenticationConfig {
        AuthenticationConfig {
            handler_timeout: Duration::from_millis(200),
            continue_on_error,
        }
    }

    #[tokio::test]
    async fn test_unsupported_credential() {
        let manager = AuthenticationManager::new(&config(true))
            .with_handler(ScriptedHandler::accepting("accept", "alice"));
        let mut credential = Credential::X509(X509Credential {
            subject_dn: "CN=alice".to_string(),
            certificate: Vec::new(),
        });

        let err = manager.authenticate(&mut credential).await.unwrap_err();
        assert!(matches!(
            err,
            CasError::UnsupportedCredential {
                credential_type: CredentialType::X509
            }
        ));
    }

    #[tokio::test]
    async fn test_first_success_short_circuits() {
        let first = ScriptedHandler::accepting("first", "alice");
        let second = ScriptedHandler::accepting("second", "bob");
        let manager = AuthenticationManager::new(&config(true))
            .with_handler(first.clone())
            .with_handler(second.clone());

        let mut credential = Credential::username_password("alice", "pw");
        let authentication = manager.authenticate(&mut credential).await.unwrap();

        assert_eq!(authentication.principal().name(), "alice");
        assert_eq!(authentication.method(), Some("first"));
        assert_eq!(first.calls(), 1);
        assert_eq!(second.calls(), 0);
    }

    #[tokio::test]
    async fn test_rejection_falls_through_to_next_handler() {
        let rejecting =
            ScriptedHandler::failing("rejecting", AuthenticationError::bad_credentials("no"));
        let accepting = ScriptedHandler::accepting("accepting", "alice");
        let manager = AuthenticationManager::new(&config(false))
            .with_handler(rejecting.clone())
            .with_handler(accepting.clone());

        let mut credential = Credential::username_password("alice", "pw");
        let authentication = manager.authenticate(&mut credential).await.unwrap();
        assert_eq!(authentication.method(), Some("accepting"));
        assert_eq!(rejecting.calls(), 1);
    }

    #[tokio::test]
    async fn test_all_failures_are_aggregated() {
        let manager = AuthenticationManager::new(&config(true))
            .with_handler(ScriptedHandler::failing(
                "ldap",
                AuthenticationError::handler_unavailable("connection refused"),
            ))
            .with_handler(ScriptedHandler::failing(
                "local",
                AuthenticationError::account_disabled("locked by admin"),
            ));

        let mut credential = Credential::username_password("alice", "pw");
        let err = manager.authenticate(&mut credential).await.unwrap_err();

        let CasError::AuthenticationFailed { failures } = err else {
            panic!("expected aggregated failure, got {err:?}");
        };
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].handler, "ldap");
        assert_eq!(
            failures[0].error.kind(),
            AuthenticationErrorKind::HandlerUnavailable
        );
        assert_eq!(
            failures[1].error.kind(),
            AuthenticationErrorKind::AccountDisabled
        );
    }

    #[tokio::test]
    async fn test_unavailable_handler_stops_chain_without_continue_on_error() {
        let next = ScriptedHandler::accepting("next", "alice");
        let manager = AuthenticationManager::new(&config(false))
            .with_handler(ScriptedHandler::failing(
                "ldap",
                AuthenticationError::handler_unavailable("connection refused"),
            ))
            .with_handler(next.clone());

        let mut credential = Credential::username_password("alice", "pw");
        let err = manager.authenticate(&mut credential).await.unwrap_err();

        assert!(matches!(err, CasError::HandlerUnavailable { ref handler, .. } if handler == "ldap"));
        assert_eq!(next.calls(), 0);
    }

    #[tokio::test]
    async fn test_unavailable_handler_is_skipped_with_continue_on_error() {
        let manager = AuthenticationManager::new(&config(true))
            .with_handler(ScriptedHandler::failing(
                "ldap",
                AuthenticationError::handler_unavailable("connection refused"),
            ))
            .with_handler(ScriptedHandler::accepting("local", "alice"));

        let mut credential = Credential::username_password("alice", "pw");
        let authentication = manager.authenticate(&mut credential).await.unwrap();
        assert_eq!(authentication.method(), Some("local"));
    }

    #[tokio::test]
    async fn test_handler_timeout_is_unavailable() {
        let manager = AuthenticationManager::new(&config(true))
            .with_handler(ScriptedHandler::slow("slow", Duration::from_secs(5)));

        let mut credential = Credential::username_password("alice", "pw");
        let started = std::time::Instant::now();
        let err = manager.authenticate(&mut credential).await.unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(2));
        let CasError::AuthenticationFailed { failures } = err else {
            panic!("expected aggregated failure, got {err:?}");
        };
        assert_eq!(
            failures[0].error.kind(),
            AuthenticationErrorKind::HandlerUnavailable
        );
    }

    #[tokio::test]
    async fn test_continuation_ends_the_chain() {
        let negotiating = ScriptedHandler::failing(
            "negotiate",
            AuthenticationError::continuation_required("send the next token"),
        );
        let next = ScriptedHandler::accepting("next", "alice");
        let manager = AuthenticationManager::new(&config(true))
            .with_handler(negotiating.clone())
            .with_handler(next.clone());

        let mut credential = Credential::username_password("alice", "pw");
        let err = manager.authenticate(&mut credential).await.unwrap_err();

        let CasError::AuthenticationFailed { failures } = err else {
            panic!("expected a failed authentication, got {err:?}");
        };
        assert_eq!(failures.len(), 1);
        assert_eq!(
            failures[0].error.kind(),
            AuthenticationErrorKind::ContinuationRequired
        );
        assert_eq!(negotiating.calls(), 1);
        assert_eq!(next.calls(), 0);
    }

    #[test]
    fn test_handler_count() {
        let manager = AuthenticationManager::new(&config(true))
            .with_handler(ScriptedHandler::accepting("a", "x"))
            .with_handler(ScriptedHandler::accepting("b", "y"));
        assert_eq!(manager.handler_count(), 2);
    }
}
