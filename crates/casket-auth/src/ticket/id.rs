//! Ticket identifiers.
//!
//! Format: `{PREFIX}-{counter}-{random}[-{suffix}]`, where `random` is 32 bytes from
//! the thread RNG encoded as unpadded base64url (43 characters). The counter is
//! process-local and only aids debugging; unguessability comes from the random part.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

/// Prefix of proxy-granting ticket IOUs.
pub const PGT_IOU_PREFIX: &str = "PGTIOU";

/// Number of characters of the random part kept by [`TicketId::redacted`].
const REDACTED_VISIBLE: usize = 4;

/// An opaque ticket identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(String);

impl TicketId {
    /// Wraps an existing identifier string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the prefix (`TGT`, `ST`, ...).
    #[must_use]
    pub fn prefix(&self) -> &str {
        self.0.split('-').next().unwrap_or_default()
    }

    /// Returns a form safe for logs: prefix, counter and the first few random characters.
    ///
    /// Ticket ids are bearer secrets and must never be logged in full.
    #[must_use]
    pub fn redacted(&self) -> String {
        let mut parts = self.0.splitn(3, '-');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(prefix), Some(counter), Some(rest)) => {
                let visible: String = rest.chars().take(REDACTED_VISIBLE).collect();
                format!("{prefix}-{counter}-{visible}…")
            }
            _ => {
                let visible: String = self.0.chars().take(REDACTED_VISIBLE).collect();
                format!("{visible}…")
            }
        }
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TicketId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Generates unique ticket identifiers.
#[derive(Debug, Default)]
pub struct TicketIdGenerator {
    counter: AtomicU64,
    suffix: Option<String>,
}

impl TicketIdGenerator {
    /// Creates a generator that appends `suffix` (typically a node name) to every id.
    #[must_use]
    pub fn new(suffix: Option<String>) -> Self {
        Self {
            counter: AtomicU64::new(0),
            suffix,
        }
    }

    /// Generates a new id with the given prefix.
    #[must_use]
    pub fn generate(&self, prefix: &str) -> TicketId {
        let counter = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let random = random_token();
        let id = match &self.suffix {
            Some(suffix) => format!("{prefix}-{counter}-{random}-{suffix}"),
            None => format!("{prefix}-{counter}-{random}"),
        };
        TicketId(id)
    }
}

/// 256 random bits, base64url encoded without padding.
fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
