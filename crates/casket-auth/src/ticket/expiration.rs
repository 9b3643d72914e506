//! Expiration policies.
//!
//! A policy is a pure predicate over a ticket's usage record and the current time.
//! The registry evaluates it lazily on every lookup and the background sweep
//! evaluates the same predicate, so the two can never disagree.
//!
//! Elapsed time is measured with `>=`: a zero lifetime means "expired immediately".
//! A clock that moved backwards (negative elapsed time) never expires anything.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// The time/use facts a policy looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TicketUsage {
    /// When the ticket was created.
    pub created_at: OffsetDateTime,
    /// When the ticket was last used (creation counts as a use of the clock).
    pub last_used_at: OffsetDateTime,
    /// How many times the ticket has been used.
    pub use_count: u32,
}

impl TicketUsage {
    /// Usage of a ticket created at `now` and never used.
    #[must_use]
    pub fn fresh(now: OffsetDateTime) -> Self {
        Self {
            created_at: now,
            last_used_at: now,
            use_count: 0,
        }
    }
}

/// When a ticket stops being usable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExpirationPolicy {
    /// Never expires on its own.
    Never,

    /// Expires a fixed time after creation.
    Timeout {
        /// Lifetime from creation.
        #[serde(with = "humantime_serde")]
        time_to_live: Duration,
    },

    /// Expires a fixed time after creation, regardless of use.
    HardTimeout {
        /// Lifetime from creation.
        #[serde(with = "humantime_serde")]
        time_to_kill: Duration,
    },

    /// Expires after a period without use.
    IdleTimeout {
        /// Maximum time between uses.
        #[serde(with = "humantime_serde")]
        time_to_idle: Duration,
    },

    /// Expires after a lifetime or an idle period, whichever comes first, and allows
    /// at most `max_uses` uses. Unset limits are not enforced.
    ///
    /// A ticket that has used up its allowance is exhausted, not expired: what it
    /// already granted stays valid, further uses are refused (see
    /// [`ExpirationPolicy::is_exhausted`]).
    MultiTimeUseOrTimeout {
        /// Maximum number of uses.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_uses: Option<u32>,
        /// Lifetime from creation.
        #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
        time_to_live: Option<Duration>,
        /// Maximum time between uses.
        #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
        time_to_idle: Option<Duration>,
    },

    /// Expires after `time_to_kill` without use, and treats uses closer together than
    /// `time_in_between_uses` as expired (throttling).
    ThrottledUseAndTimeout {
        /// Maximum time between uses.
        #[serde(with = "humantime_serde")]
        time_to_kill: Duration,
        /// Minimum spacing between uses.
        #[serde(with = "humantime_serde")]
        time_in_between_uses: Duration,
    },

    /// Expires as soon as any of the inner policies does.
    AnyOf {
        /// The combined policies.
        policies: Vec<ExpirationPolicy>,
    },
}

impl ExpirationPolicy {
    /// Returns `true` if a ticket with `usage` is expired at `now`.
    #[must_use]
    pub fn is_expired(&self, usage: &TicketUsage, now: OffsetDateTime) -> bool {
        match self {
            Self::Never => false,
            Self::Timeout { time_to_live } => reached(usage.created_at, now, *time_to_live),
            Self::HardTimeout { time_to_kill } => reached(usage.created_at, now, *time_to_kill),
            Self::IdleTimeout { time_to_idle } => reached(usage.last_used_at, now, *time_to_idle),
            Self::MultiTimeUseOrTimeout {
                max_uses,
                time_to_live,
                time_to_idle,
            } => {
                max_uses.is_some_and(|max| usage.use_count > max)
                    || time_to_live.is_some_and(|ttl| reached(usage.created_at, now, ttl))
                    || time_to_idle.is_some_and(|tti| reached(usage.last_used_at, now, tti))
            }
            Self::ThrottledUseAndTimeout {
                time_to_kill,
                time_in_between_uses,
            } => {
                if reached(usage.last_used_at, now, *time_to_kill) {
                    return true;
                }
                usage.use_count > 0 && !reached(usage.last_used_at, now, *time_in_between_uses)
            }
            Self::AnyOf { policies } => policies.iter().any(|p| p.is_expired(usage, now)),
        }
    }

    /// Returns `true` if a ticket with `usage` may not be used again.
    #[must_use]
    pub fn is_exhausted(&self, usage: &TicketUsage) -> bool {
        match self {
            Self::MultiTimeUseOrTimeout {
                max_uses: Some(max),
                ..
            } => usage.use_count >= *max,
            Self::AnyOf { policies } => policies.iter().any(|p| p.is_exhausted(usage)),
            _ => false,
        }
    }
}

/// Returns `true` if at least `limit` has elapsed between `since` and `now`.
fn reached(since: OffsetDateTime, now: OffsetDateTime, limit: Duration) -> bool {
    match Duration::try_from(now - since) {
        Ok(elapsed) => elapsed >= limit,
        Err(_) => false,
    }
}
