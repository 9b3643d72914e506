//! Background expiration sweep.
//!
//! Runs [`TicketRegistry::sweep`] on a fixed interval, independent of any ticket's
//! policy. Dropping the [`CleanerHandle`] also stops the task.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use super::ticket_registry::TicketRegistry;
use crate::config::RegistryConfig;

/// Periodic registry sweeper.
pub struct RegistryCleaner {
    registry: TicketRegistry,
    interval: Duration,
    initial_delay: Duration,
}

impl RegistryCleaner {
    /// Creates a sweeper for `registry`.
    #[must_use]
    pub fn new(registry: TicketRegistry, config: &RegistryConfig) -> Self {
        Self {
            registry,
            interval: config.sweep_interval,
            initial_delay: config.sweep_initial_delay,
        }
    }

    /// Starts the sweep loop on the current tokio runtime.
    #[must_use = "dropping the handle stops the sweeper"]
    pub fn spawn(self) -> CleanerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            info!(
                interval = ?self.interval,
                initial_delay = ?self.initial_delay,
                "Ticket registry cleaner started"
            );

            let mut ticker = interval_at(Instant::now() + self.initial_delay, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.registry.sweep().await {
                            Ok(report) => debug!(
                                examined = report.examined,
                                removed = report.removed,
                                "Registry sweep finished"
                            ),
                            Err(e) => error!(error = %e, "Registry sweep failed"),
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            info!("Ticket registry cleaner shutting down");
                            break;
                        }
                    }
                }
            }
        });

        CleanerHandle { shutdown_tx, task }
    }
}

/// Handle to a running [`RegistryCleaner`].
pub struct CleanerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl CleanerHandle {
    /// Stops the sweeper and waits for an in-flight sweep to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "Ticket registry cleaner task failed");
        }
    }

    /// Returns `true` once the sweep loop has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authentication::Authentication;
    use crate::principal::AttributePrincipal;
    use crate::ticket::{ExpirationPolicy, Ticket, TicketIdGenerator};
    use time::OffsetDateTime;

    fn config(interval_ms: u64) -> RegistryConfig {
        RegistryConfig {
            sweep_enabled: true,
            sweep_interval: Duration::from_millis(interval_ms),
            sweep_initial_delay: Duration::ZERO,
        }
    }

    async fn add_ticket(registry: &TicketRegistry, policy: ExpirationPolicy) {
        let now = OffsetDateTime::now_utc();
        let ticket = Ticket::ticket_granting(
            TicketIdGenerator::default().generate("TGT"),
            Authentication::new(AttributePrincipal::new("alice"), "test", now),
            policy,
            now,
        );
        registry.add_ticket(ticket).await.unwrap();
    }

    #[tokio::test]
    async fn test_cleaner_removes_expired_tickets() {
        let registry = TicketRegistry::in_memory();
        add_ticket(&registry, ExpirationPolicy::Never).await;
        add_ticket(
            &registry,
            ExpirationPolicy::Timeout {
                time_to_live: Duration::from_millis(50),
            },
        )
        .await;

        let handle = RegistryCleaner::new(registry.clone(), &config(20)).spawn();
        tokio::time::sleep(Duration::from_millis(300)).await;
        handle.shutdown().await;

        assert_eq!(registry.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_drains_task() {
        let registry = TicketRegistry::in_memory();
        let handle = RegistryCleaner::new(registry, &config(10_000)).spawn();
        assert!(!handle.is_finished());

        tokio::time::timeout(Duration::from_secs(2), handle.shutdown())
            .await
            .expect("cleaner should stop promptly");
    }
}
