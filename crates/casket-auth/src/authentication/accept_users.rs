//! Username/password handler over a fixed account table.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::credential::{Credential, CredentialType};
use super::handler::AuthenticationHandler;
use super::password::{hash_password, verify_password};
use crate::error::{AuthenticationError, AuthenticationErrorKind};
use crate::principal::{AttributePrincipal, AttributePrincipalFactory, ResolutionError};

/// A locally stored account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    /// Argon2 PHC hash of the password.
    pub password_hash: String,

    /// Disabled accounts are rejected even with the right password.
    #[serde(default)]
    pub disabled: bool,

    /// Accounts past this instant are rejected.
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_at: Option<OffsetDateTime>,
}

impl UserAccount {
    /// Creates an enabled, non-expiring account.
    #[must_use]
    pub fn new(password_hash: impl Into<String>) -> Self {
        Self {
            password_hash: password_hash.into(),
            disabled: false,
            expires_at: None,
        }
    }
}

/// Authenticates username/password credentials against a fixed account table.
///
/// Unknown users and wrong passwords are indistinguishable to the caller: an unknown
/// user's password is checked against a throwaway hash so both paths pay for one
/// Argon2 verification. Account state is only reported once the password has been
/// verified.
pub struct AcceptUsersAuthenticationHandler {
    name: String,
    accounts: HashMap<String, UserAccount>,
    principal_factory: Arc<dyn AttributePrincipalFactory>,
}

impl AcceptUsersAuthenticationHandler {
    /// Default handler name.
    pub const DEFAULT_NAME: &'static str = "accept-users";

    /// Creates a handler over `accounts`.
    #[must_use]
    pub fn new(
        accounts: HashMap<String, UserAccount>,
        principal_factory: Arc<dyn AttributePrincipalFactory>,
    ) -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            accounts,
            principal_factory,
        }
    }

    /// Overrides the handler name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl AuthenticationHandler for AcceptUsersAuthenticationHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn credential_type(&self) -> CredentialType {
        CredentialType::UsernamePassword
    }

    async fn authenticate(
        &self,
        credential: &mut Credential,
    ) -> Result<AttributePrincipal, AuthenticationError> {
        let Credential::UsernamePassword(credential) = credential else {
            return Err(AuthenticationError::handler_unavailable(
                "expected a username/password credential",
            ));
        };

        let account = self.accounts.get(credential.username());
        let hash = match account {
            Some(account) => account.password_hash.clone(),
            None => {
                tracing::debug!(username = credential.username(), "Unknown user");
                match unknown_user_hash() {
                    Some(hash) => hash.to_string(),
                    None => {
                        return Err(AuthenticationError::bad_credentials(
                            "invalid username or password",
                        ));
                    }
                }
            }
        };

        let password = credential.password().to_string();
        let matches = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| {
                AuthenticationError::handler_unavailable(format!("verification task failed: {e}"))
            })?
            .map_err(|e| {
                AuthenticationError::handler_unavailable(format!("stored hash is invalid: {e}"))
            })?;

        let Some(account) = account.filter(|_| matches) else {
            return Err(AuthenticationError::bad_credentials(
                "invalid username or password",
            ));
        };

        if account.disabled {
            return Err(AuthenticationError::account_disabled(format!(
                "account '{}' is disabled",
                credential.username()
            )));
        }

        if let Some(expires_at) = account.expires_at {
            if expires_at <= OffsetDateTime::now_utc() {
                return Err(AuthenticationError::account_expired(format!(
                    "account '{}' expired",
                    credential.username()
                )));
            }
        }

        self.principal_factory
            .get_attribute_principal(credential.username())
            .await
            .map_err(|e| match e {
                ResolutionError::NotFound(_) => {
                    AuthenticationError::new(AuthenticationErrorKind::PrincipalResolution, e.to_string())
                }
                ResolutionError::Unavailable(_) => {
                    AuthenticationError::handler_unavailable(e.to_string())
                }
            })
    }
}

/// Hash that unknown usernames are verified against. `None` if hashing failed.
fn unknown_user_hash() -> Option<&'static str> {
    static HASH: OnceLock<Option<String>> = OnceLock::new();
    HASH.get_or_init(|| hash_password("casket-unknown-user").ok())
        .as_deref()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::principal::{SimpleAttributePrincipalFactory, StaticAttributePrincipalFactory};
    use argon2::password_hash::{rand_core::OsRng, PasswordHasher, SaltString};
    use argon2::{Algorithm, Argon2, Params, Version};
    use time::Duration;

    /// Cheap Argon2 parameters so the tests stay fast.
    fn quick_hash(password: &str) -> String {
        let params = Params::new(8, 1, 1, None).unwrap();
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let salt = SaltString::generate(&mut OsRng);
        argon2
            .hash_password(password.as_bytes(), &salt)
            .unwrap()
            .to_string()
    }

    fn handler_with(accounts: Vec<(&str, UserAccount)>) -> AcceptUsersAuthenticationHandler {
        let accounts = accounts
            .into_iter()
            .map(|(name, account)| (name.to_string(), account))
            .collect();
        AcceptUsersAuthenticationHandler::new(accounts, Arc::new(SimpleAttributePrincipalFactory))
    }

    #[tokio::test]
    async fn test_valid_password() {
        let handler = handler_with(vec![("alice", UserAccount::new(quick_hash("pw")))]);
        let mut credential = Credential::username_password("alice", "pw");

        let principal = handler.authenticate(&mut credential).await.unwrap();
        assert_eq!(principal.name(), "alice");
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_user_look_the_same() {
        let handler = handler_with(vec![("alice", UserAccount::new(quick_hash("pw")))]);

        let mut wrong = Credential::username_password("alice", "nope");
        let wrong = handler.authenticate(&mut wrong).await.unwrap_err();
        let mut unknown = Credential::username_password("mallory", "pw");
        let unknown = handler.authenticate(&mut unknown).await.unwrap_err();

        assert_eq!(wrong.kind(), AuthenticationErrorKind::BadCredentials);
        assert_eq!(wrong, unknown);
    }

    #[test]
    fn test_unknown_user_hash_is_verifiable() {
        let hash = unknown_user_hash().unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(!verify_password("pw", hash).unwrap());
        assert_eq!(unknown_user_hash(), Some(hash));
    }

    #[tokio::test]
    async fn test_unknown_user_is_verified_before_rejection() {
        let handler = handler_with(Vec::new());
        // Warm the shared hash so the timing below covers verification only.
        unknown_user_hash().unwrap();

        let mut credential = Credential::username_password("mallory", "pw");
        let started = std::time::Instant::now();
        let err = handler.authenticate(&mut credential).await.unwrap_err();

        assert_eq!(err.kind(), AuthenticationErrorKind::BadCredentials);
        assert!(started.elapsed() >= std::time::Duration::from_millis(1));
    }

    #[tokio::test]
    async fn test_disabled_account() {
        let mut account = UserAccount::new(quick_hash("pw"));
        account.disabled = true;
        let handler = handler_with(vec![("bob", account)]);

        let mut credential = Credential::username_password("bob", "pw");
        let err = handler.authenticate(&mut credential).await.unwrap_err();
        assert_eq!(err.kind(), AuthenticationErrorKind::AccountDisabled);
    }

    #[tokio::test]
    async fn test_expired_account() {
        let mut account = UserAccount::new(quick_hash("pw"));
        account.expires_at = Some(OffsetDateTime::now_utc() - Duration::days(1));
        let handler = handler_with(vec![("carol", account)]);

        let mut credential = Credential::username_password("carol", "pw");
        let err = handler.authenticate(&mut credential).await.unwrap_err();
        assert_eq!(err.kind(), AuthenticationErrorKind::AccountExpired);
    }

    #[tokio::test]
    async fn test_malformed_hash_is_unavailable() {
        let handler = handler_with(vec![("dave", UserAccount::new("not-a-phc-string"))]);

        let mut credential = Credential::username_password("dave", "pw");
        let err = handler.authenticate(&mut credential).await.unwrap_err();
        assert_eq!(err.kind(), AuthenticationErrorKind::HandlerUnavailable);
    }

    #[tokio::test]
    async fn test_unresolvable_principal() {
        let accounts = HashMap::from([("erin".to_string(), UserAccount::new(quick_hash("pw")))]);
        let factory = StaticAttributePrincipalFactory::new(HashMap::new()).with_strict(true);
        let handler = AcceptUsersAuthenticationHandler::new(accounts, Arc::new(factory))
            .with_name("local");

        let mut credential = Credential::username_password("erin", "pw");
        let err = handler.authenticate(&mut credential).await.unwrap_err();
        assert_eq!(err.kind(), AuthenticationErrorKind::PrincipalResolution);
        assert_eq!(handler.name(), "local");
    }

    #[test]
    fn test_supports_only_username_password() {
        let handler = handler_with(Vec::new());
        assert!(handler.supports(&Credential::username_password("a", "b")));
        assert!(!handler.supports(&Credential::spnego(vec![1, 2, 3])));
    }

    #[test]
    fn test_account_deserialization() {
        let account: UserAccount = serde_json::from_str(
            r#"{"password_hash": "$argon2id$x", "expires_at": "2030-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert!(!account.disabled);
        assert_eq!(account.expires_at.map(|t| t.year()), Some(2030));
    }
}
