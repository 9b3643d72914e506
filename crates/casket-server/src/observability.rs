//! Tracing setup for the server process.
//!
//! The filter comes from `logging.level` unless `RUST_LOG` was set at startup, in which
//! case `RUST_LOG` pins it. The returned [`LogLevelHandle`] swaps the configured level
//! while the server runs.

use anyhow::Context;
use tracing::Dispatch;
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

use crate::config::LoggingConfig;

type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Replaces the active log filter at runtime.
#[derive(Clone)]
pub struct LogLevelHandle {
    filter: FilterHandle,
    /// `RUST_LOG` was set at startup.
    pinned: bool,
}

impl LogLevelHandle {
    /// Applies `cfg.level`. Returns `false` if `RUST_LOG` pins the filter.
    ///
    /// # Errors
    ///
    /// Fails if the level is not a valid filter or the subscriber has been dropped.
    pub fn apply(&self, cfg: &LoggingConfig) -> anyhow::Result<bool> {
        if self.pinned {
            return Ok(false);
        }
        let filter = build_filter(cfg, None)?;
        self.filter
            .reload(filter)
            .context("tracing subscriber is no longer installed")?;
        Ok(true)
    }

    /// The active filter directives.
    #[must_use]
    pub fn current(&self) -> Option<String> {
        self.filter.with_current(ToString::to_string).ok()
    }
}

/// Builds the filter for `cfg`, preferring `rust_log` when given.
///
/// # Errors
///
/// Fails if the chosen directives do not parse.
pub fn build_filter(cfg: &LoggingConfig, rust_log: Option<&str>) -> anyhow::Result<EnvFilter> {
    match rust_log {
        Some(directives) => EnvFilter::try_new(directives)
            .with_context(|| format!("RUST_LOG '{directives}' is not a valid filter")),
        None => EnvFilter::try_new(&cfg.level)
            .with_context(|| format!("logging.level '{}' is not a valid filter", cfg.level)),
    }
}

fn dispatch(cfg: &LoggingConfig, filter: EnvFilter) -> (Dispatch, FilterHandle) {
    let (filter_layer, handle) = reload::Layer::new(filter);
    let subscriber = tracing_subscriber::registry().with(filter_layer).with(
        fmt::layer()
            .with_ansi(cfg.ansi)
            .with_target(cfg.with_target),
    );
    (Dispatch::new(subscriber), handle)
}

/// Installs the global subscriber described by `cfg`.
///
/// # Errors
///
/// Fails if the filter does not parse or a global subscriber is already installed.
pub fn init_tracing(cfg: &LoggingConfig, rust_log: Option<&str>) -> anyhow::Result<LogLevelHandle> {
    let (dispatch, filter) = dispatch(cfg, build_filter(cfg, rust_log)?);
    dispatch
        .try_init()
        .context("a global tracing subscriber is already installed")?;
    Ok(LogLevelHandle {
        filter,
        pinned: rust_log.is_some(),
    })
}
