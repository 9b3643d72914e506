//! The authentication handler contract.

use async_trait::async_trait;

use super::credential::{Credential, CredentialType};
use crate::error::AuthenticationError;
use crate::principal::AttributePrincipal;

/// A pluggable credential verifier.
///
/// Each handler declares the credential variant it serves; the manager indexes handlers
/// by that tag and then asks [`supports`](Self::supports) for the final say.
///
/// # Contract
///
/// - `authenticate` either returns a principal or an error, never both and never a
///   principal on failure.
/// - Low-level trouble (I/O, malformed input, an unreachable directory) is reported as
///   [`AuthenticationErrorKind::HandlerUnavailable`], not as bad credentials.
/// - Principals are built through an
///   [`AttributePrincipalFactory`](crate::principal::AttributePrincipalFactory).
/// - The handler may write negotiation output into the credential (SPNEGO does).
///
/// [`AuthenticationErrorKind::HandlerUnavailable`]: crate::error::AuthenticationErrorKind::HandlerUnavailable
#[async_trait]
pub trait AuthenticationHandler: Send + Sync {
    /// A stable name used in logs and aggregated failures.
    fn name(&self) -> &str;

    /// The credential variant this handler serves.
    fn credential_type(&self) -> CredentialType;

    /// Returns `true` if this handler can evaluate `credential`.
    fn supports(&self, credential: &Credential) -> bool {
        credential.credential_type() == self.credential_type()
    }

    /// Verifies the credential and resolves the principal.
    async fn authenticate(
        &self,
        credential: &mut Credential,
    ) -> Result<AttributePrincipal, AuthenticationError>;
}
