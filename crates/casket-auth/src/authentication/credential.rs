//! Credential variants presented for authentication.
//!
//! A credential lives for exactly one authentication attempt. Each variant carries
//! the raw material its handlers need; the manager only ever looks at the tag
//! returned by [`Credential::credential_type`].

use std::fmt;

use crate::principal::AttributePrincipal;

/// NTLMSSP message signature.
const NTLMSSP_SIGNATURE: &[u8] = b"NTLMSSP\0";

/// Tag identifying a credential variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialType {
    /// Username and password.
    UsernamePassword,
    /// SPNEGO (Kerberos or NTLM) negotiation token.
    Spnego,
    /// X.509 client certificate.
    X509,
}

impl CredentialType {
    /// Returns the tag as a string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UsernamePassword => "username/password",
            Self::Spnego => "spnego",
            Self::X509 => "x509",
        }
    }
}

impl fmt::Display for CredentialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A credential presented for authentication.
#[derive(Debug, Clone)]
pub enum Credential {
    /// Username and password.
    UsernamePassword(UsernamePasswordCredential),
    /// SPNEGO negotiation token.
    Spnego(SpnegoCredential),
    /// X.509 client certificate.
    X509(X509Credential),
}

impl Credential {
    /// Creates a username/password credential.
    #[must_use]
    pub fn username_password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::UsernamePassword(UsernamePasswordCredential::new(username, password))
    }

    /// Creates a SPNEGO credential from the client's initial token.
    #[must_use]
    pub fn spnego(init_token: impl Into<Vec<u8>>) -> Self {
        Self::Spnego(SpnegoCredential::new(init_token))
    }

    /// Returns the variant tag.
    #[must_use]
    pub fn credential_type(&self) -> CredentialType {
        match self {
            Self::UsernamePassword(_) => CredentialType::UsernamePassword,
            Self::Spnego(_) => CredentialType::Spnego,
            Self::X509(_) => CredentialType::X509,
        }
    }

    /// Returns the SPNEGO credential, if this is one.
    #[must_use]
    pub fn as_spnego(&self) -> Option<&SpnegoCredential> {
        match self {
            Self::Spnego(c) => Some(c),
            _ => None,
        }
    }
}

/// Username and password.
#[derive(Clone)]
pub struct UsernamePasswordCredential {
    username: String,
    password: String,
}

impl UsernamePasswordCredential {
    /// Creates a new credential.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Returns the username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for UsernamePasswordCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UsernamePasswordCredential")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// SPNEGO negotiation state for one request.
///
/// After a successful negotiation the handler stores the resolved principal and the
/// continuation token to relay to the client. After a failed one both are absent.
#[derive(Clone)]
pub struct SpnegoCredential {
    init_token: Vec<u8>,
    next_token: Option<Vec<u8>>,
    principal: Option<AttributePrincipal>,
}

impl SpnegoCredential {
    /// Creates a credential from the client's initial token.
    #[must_use]
    pub fn new(init_token: impl Into<Vec<u8>>) -> Self {
        Self {
            init_token: init_token.into(),
            next_token: None,
            principal: None,
        }
    }

    /// Returns the token sent by the client.
    #[must_use]
    pub fn init_token(&self) -> &[u8] {
        &self.init_token
    }

    /// Returns the token to relay back to the client, if any.
    #[must_use]
    pub fn next_token(&self) -> Option<&[u8]> {
        self.next_token.as_deref()
    }

    /// Returns the principal resolved by a successful negotiation.
    #[must_use]
    pub fn principal(&self) -> Option<&AttributePrincipal> {
        self.principal.as_ref()
    }

    /// Returns `true` if the client sent an NTLM (rather than Kerberos) token.
    #[must_use]
    pub fn is_ntlm(&self) -> bool {
        self.init_token.starts_with(NTLMSSP_SIGNATURE)
    }

    pub(crate) fn set_next_token(&mut self, token: Option<Vec<u8>>) {
        self.next_token = token;
    }

    pub(crate) fn set_principal(&mut self, principal: AttributePrincipal) {
        self.principal = Some(principal);
    }

    /// Clears all negotiation output.
    pub(crate) fn reset(&mut self) {
        self.next_token = None;
        self.principal = None;
    }
}

impl fmt::Debug for SpnegoCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpnegoCredential")
            .field("init_token_len", &self.init_token.len())
            .field("has_next_token", &self.next_token.is_some())
            .field("principal", &self.principal.as_ref().map(|p| p.name()))
            .finish()
    }
}

/// X.509 client certificate.
#[derive(Debug, Clone)]
pub struct X509Credential {
    /// Subject distinguished name.
    pub subject_dn: String,
    /// DER-encoded certificate.
    pub certificate: Vec<u8>,
}
