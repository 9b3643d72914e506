//! SPNEGO (Kerberos/NTLM) authentication handler.
//!
//! Token validation is delegated to a [`SpnegoNegotiator`]; this module never parses
//! Kerberos or NTLM messages itself. It only maps the negotiated identity to a
//! principal name and relays the continuation token through the credential.

use std::sync::Arc;

use async_trait::async_trait;

use super::credential::{Credential, CredentialType};
use super::handler::AuthenticationHandler;
use crate::config::SpnegoConfig;
use crate::error::{AuthenticationError, AuthenticationErrorKind};
use crate::principal::{AttributePrincipal, AttributePrincipalFactory, ResolutionError};

/// Result of one negotiation round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NegotiationOutcome {
    /// The authenticated identity (`user@REALM` or `DOMAIN\user`), once established.
    pub principal_name: Option<String>,
    /// Token to relay back to the client.
    pub next_token: Option<Vec<u8>>,
}

/// Negotiation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NegotiationError {
    /// The token was checked and rejected.
    #[error("negotiation rejected: {0}")]
    Rejected(String),

    /// The security context could not be established (KDC unreachable, bad keytab).
    #[error("negotiator unavailable: {0}")]
    Unavailable(String),
}

/// External security-context negotiator.
#[async_trait]
pub trait SpnegoNegotiator: Send + Sync {
    /// Accepts a client token and advances the security context.
    async fn negotiate(&self, token: &[u8]) -> Result<NegotiationOutcome, NegotiationError>;
}

/// Authenticates SPNEGO credentials through a [`SpnegoNegotiator`].
///
/// On any failure the credential carries neither a principal nor a next token, with
/// one exception: a round that needs another client round trip keeps its next token
/// and fails with `ContinuationRequired`.
pub struct SpnegoAuthenticationHandler {
    name: String,
    negotiator: Arc<dyn SpnegoNegotiator>,
    principal_factory: Arc<dyn AttributePrincipalFactory>,
    principal_with_domain_name: bool,
    ntlm_allowed: bool,
}

impl SpnegoAuthenticationHandler {
    /// Default handler name.
    pub const DEFAULT_NAME: &'static str = "spnego";

    /// Creates a handler.
    #[must_use]
    pub fn new(
        negotiator: Arc<dyn SpnegoNegotiator>,
        principal_factory: Arc<dyn AttributePrincipalFactory>,
        config: &SpnegoConfig,
    ) -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            negotiator,
            principal_factory,
            principal_with_domain_name: config.principal_with_domain_name,
            ntlm_allowed: config.ntlm_allowed,
        }
    }

    /// Overrides the handler name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets whether the domain/realm part is kept in principal names.
    #[must_use]
    pub fn with_principal_with_domain_name(mut self, keep: bool) -> Self {
        self.principal_with_domain_name = keep;
        self
    }

    /// Maps a negotiated identity to a principal name.
    ///
    /// With `principal_with_domain_name` the identity is used as-is. Otherwise NTLM
    /// `DOMAIN\user` becomes `user` and Kerberos `user@REALM` becomes `user`.
    #[must_use]
    pub fn simple_principal_name(&self, name: &str, is_ntlm: bool) -> String {
        if self.principal_with_domain_name {
            return name.to_string();
        }
        if is_ntlm {
            if is_domain_qualified(name) {
                return name.split('\\').nth(1).unwrap_or(name).to_string();
            }
            return name.to_string();
        }
        name.split('@').next().unwrap_or(name).to_string()
    }
}

/// `DOMAIN\user` with no whitespace on either side.
fn is_domain_qualified(name: &str) -> bool {
    match name.split_once('\\') {
        Some((domain, user)) => {
            !domain.is_empty() && !user.is_empty() && !name.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

#[async_trait]
impl AuthenticationHandler for SpnegoAuthenticationHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn credential_type(&self) -> CredentialType {
        CredentialType::Spnego
    }

    async fn authenticate(
        &self,
        credential: &mut Credential,
    ) -> Result<AttributePrincipal, AuthenticationError> {
        let Credential::Spnego(credential) = credential else {
            return Err(AuthenticationError::handler_unavailable(
                "expected a SPNEGO credential",
            ));
        };
        credential.reset();

        let is_ntlm = credential.is_ntlm();
        if is_ntlm && !self.ntlm_allowed {
            return Err(AuthenticationError::bad_credentials("NTLM is not allowed"));
        }

        let outcome = match self.negotiator.negotiate(credential.init_token()).await {
            Ok(outcome) => outcome,
            Err(NegotiationError::Rejected(message)) => {
                tracing::debug!(handler = %self.name, %message, "SPNEGO token rejected");
                return Err(AuthenticationError::bad_credentials(message));
            }
            Err(NegotiationError::Unavailable(message)) => {
                return Err(AuthenticationError::handler_unavailable(message));
            }
        };

        let Some(raw_name) = outcome.principal_name else {
            if outcome.next_token.is_some() {
                credential.set_next_token(outcome.next_token);
                return Err(AuthenticationError::continuation_required(
                    "negotiation needs another round trip",
                ));
            }
            return Err(AuthenticationError::bad_credentials(
                "negotiation established no identity",
            ));
        };

        let name = self.simple_principal_name(&raw_name, is_ntlm);
        let principal = self
            .principal_factory
            .get_attribute_principal(&name)
            .await
            .map_err(|e| match e {
                ResolutionError::NotFound(_) => AuthenticationError::new(
                    AuthenticationErrorKind::PrincipalResolution,
                    e.to_string(),
                ),
                ResolutionError::Unavailable(_) => {
                    AuthenticationError::handler_unavailable(e.to_string())
                }
            })?;

        credential.set_next_token(outcome.next_token);
        credential.set_principal(principal.clone());
        Ok(principal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::principal::SimpleAttributePrincipalFactory;

    /// Negotiator that either accepts every token as `test` or rejects it.
    struct MockNegotiator {
        outcome: Result<NegotiationOutcome, NegotiationError>,
    }

    impl MockNegotiator {
        fn succeeding(principal: &str) -> Arc<Self> {
            Arc::new(Self {
                outcome: Ok(NegotiationOutcome {
                    principal_name: Some(principal.to_string()),
                    next_token: Some(vec![7, 7, 7]),
                }),
            })
        }

        fn failing(error: NegotiationError) -> Arc<Self> {
            Arc::new(Self {
                outcome: Err(error),
            })
        }

        fn continuing() -> Arc<Self> {
            Arc::new(Self {
                outcome: Ok(NegotiationOutcome {
                    principal_name: None,
                    next_token: Some(vec![4, 2]),
                }),
            })
        }
    }

    #[async_trait]
    impl SpnegoNegotiator for MockNegotiator {
        async fn negotiate(&self, _token: &[u8]) -> Result<NegotiationOutcome, NegotiationError> {
            self.outcome.clone()
        }
    }

    fn handler(negotiator: Arc<dyn SpnegoNegotiator>) -> SpnegoAuthenticationHandler {
        SpnegoAuthenticationHandler::new(
            negotiator,
            Arc::new(SimpleAttributePrincipalFactory),
            &SpnegoConfig::default(),
        )
    }

    fn spnego_output(credential: &Credential) -> (Option<&[u8]>, Option<&AttributePrincipal>) {
        let spnego = credential.as_spnego().unwrap();
        (spnego.next_token(), spnego.principal())
    }

    #[tokio::test]
    async fn test_successful_authentication_with_domain_name() {
        let handler =
            handler(MockNegotiator::succeeding("test")).with_principal_with_domain_name(true);
        let mut credential = Credential::spnego(vec![0, 1, 2]);

        let principal = handler.authenticate(&mut credential).await.unwrap();
        assert_eq!(principal.name(), "test");

        let (next_token, stored) = spnego_output(&credential);
        assert_eq!(stored.map(AttributePrincipal::name), Some("test"));
        assert!(next_token.is_some());
    }

    #[tokio::test]
    async fn test_successful_authentication_without_domain_name() {
        let handler =
            handler(MockNegotiator::succeeding("test")).with_principal_with_domain_name(false);
        let mut credential = Credential::spnego(vec![0, 1, 2]);

        let principal = handler.authenticate(&mut credential).await.unwrap();
        assert_eq!(principal.name(), "test");
        assert!(spnego_output(&credential).0.is_some());
    }

    #[tokio::test]
    async fn test_kerberos_realm_is_stripped() {
        let handler = handler(MockNegotiator::succeeding("test@EXAMPLE.ORG"));
        let mut credential = Credential::spnego(vec![0x60, 0x82]);

        let principal = handler.authenticate(&mut credential).await.unwrap();
        assert_eq!(principal.name(), "test");
    }

    #[tokio::test]
    async fn test_unsuccessful_authentication_clears_credential() {
        let handler = handler(MockNegotiator::failing(NegotiationError::Rejected(
            "bad token".to_string(),
        )));
        let mut credential = Credential::spnego(vec![0, 1, 2]);
        if let Credential::Spnego(spnego) = &mut credential {
            spnego.set_next_token(Some(vec![1]));
            spnego.set_principal(AttributePrincipal::new("stale"));
        }

        let err = handler.authenticate(&mut credential).await.unwrap_err();
        assert_eq!(err.kind(), AuthenticationErrorKind::BadCredentials);

        let (next_token, principal) = spnego_output(&credential);
        assert!(next_token.is_none());
        assert!(principal.is_none());
    }

    #[tokio::test]
    async fn test_unavailable_negotiator() {
        let handler = handler(MockNegotiator::failing(NegotiationError::Unavailable(
            "KDC unreachable".to_string(),
        )));
        let mut credential = Credential::spnego(vec![0, 1, 2]);

        let err = handler.authenticate(&mut credential).await.unwrap_err();
        assert_eq!(err.kind(), AuthenticationErrorKind::HandlerUnavailable);
        assert!(spnego_output(&credential).1.is_none());
    }

    #[tokio::test]
    async fn test_continuation_keeps_next_token_only() {
        let handler = handler(MockNegotiator::continuing());
        let mut credential = Credential::spnego(vec![0, 1, 2]);

        let err = handler.authenticate(&mut credential).await.unwrap_err();
        assert_eq!(err.kind(), AuthenticationErrorKind::ContinuationRequired);

        let (next_token, principal) = spnego_output(&credential);
        assert_eq!(next_token, Some(&[4u8, 2][..]));
        assert!(principal.is_none());
    }

    #[tokio::test]
    async fn test_ntlm_can_be_disallowed() {
        let config = SpnegoConfig {
            principal_with_domain_name: false,
            ntlm_allowed: false,
        };
        let handler = SpnegoAuthenticationHandler::new(
            MockNegotiator::succeeding("DOMAIN\\test"),
            Arc::new(SimpleAttributePrincipalFactory),
            &config,
        );
        let mut credential = Credential::spnego(b"NTLMSSP\0\x01\0\0\0".to_vec());

        let err = handler.authenticate(&mut credential).await.unwrap_err();
        assert_eq!(err.kind(), AuthenticationErrorKind::BadCredentials);
    }

    #[tokio::test]
    async fn test_ntlm_domain_is_stripped() {
        let handler = handler(MockNegotiator::succeeding("DOMAIN\\test"));
        let mut credential = Credential::spnego(b"NTLMSSP\0\x01\0\0\0".to_vec());

        let principal = handler.authenticate(&mut credential).await.unwrap();
        assert_eq!(principal.name(), "test");
    }

    #[test]
    fn test_supports() {
        let handler = handler(MockNegotiator::succeeding("test"));
        assert!(handler.supports(&Credential::spnego(vec![0, 1, 2])));
        assert!(!handler.supports(&Credential::username_password("u", "p")));
    }

    #[test]
    fn test_simple_principal_name() {
        let ntlm_user = "DOMAIN\\Username";
        let ntlm_user_without_domain = "Username";
        let kerberos_user = "Username@DOMAIN.COM";

        let keep = handler(MockNegotiator::succeeding("test")).with_principal_with_domain_name(true);
        assert_eq!(keep.simple_principal_name(ntlm_user, true), ntlm_user);
        assert_eq!(
            keep.simple_principal_name(ntlm_user_without_domain, false),
            ntlm_user_without_domain
        );
        assert_eq!(keep.simple_principal_name(kerberos_user, false), kerberos_user);

        let strip =
            handler(MockNegotiator::succeeding("test")).with_principal_with_domain_name(false);
        assert_eq!(strip.simple_principal_name(ntlm_user, true), "Username");
        assert_eq!(
            strip.simple_principal_name(ntlm_user_without_domain, true),
            "Username"
        );
        assert_eq!(strip.simple_principal_name(kerberos_user, false), "Username");
    }
}
