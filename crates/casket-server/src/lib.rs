//! Host process for the casket CAS core.
//!
//! Wires the username/password handler chain and the ticket registry from
//! [`config::AppConfig`], runs the background registry sweep, and drains it on shutdown.

pub mod config;
pub mod observability;

use std::sync::Arc;

use anyhow::Context;
use casket_auth::{
    AcceptUsersAuthenticationHandler, AuthenticationManager, CentralAuthenticationService,
    RegistryCleaner, StaticAttributePrincipalFactory, TicketRegistry,
};

use crate::config::AppConfig;

/// Builds the CAS core described by `cfg` over an in-memory registry.
pub fn build_service(cfg: &AppConfig) -> anyhow::Result<CentralAuthenticationService> {
    let principal_factory = Arc::new(StaticAttributePrincipalFactory::new(cfg.attributes.clone()));
    let manager = AuthenticationManager::new(&cfg.cas.authentication).with_handler(Arc::new(
        AcceptUsersAuthenticationHandler::new(cfg.users.clone(), principal_factory),
    ));

    let service = CentralAuthenticationService::new(&cfg.cas, TicketRegistry::in_memory(), manager)
        .context("failed to build the central authentication service")?;

    tracing::info!(
        users = cfg.users.len(),
        services = cfg.cas.services.len(),
        "Central authentication service ready"
    );
    Ok(service)
}

/// Runs until `shutdown` resolves, sweeping the registry in the background.
pub async fn run<F>(cfg: &AppConfig, shutdown: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()>,
{
    let service = build_service(cfg)?;

    let cleaner = cfg.cas.registry.sweep_enabled.then(|| {
        RegistryCleaner::new(service.registry().clone(), &cfg.cas.registry).spawn()
    });
    if cleaner.is_none() {
        tracing::warn!("Registry sweep disabled; expired tickets are only removed on access");
    }

    shutdown.await;
    tracing::info!("Shutdown requested");

    if let Some(cleaner) = cleaner {
        cleaner.shutdown().await;
    }
    let remaining = service.registry().len().await?;
    tracing::info!(remaining, "Casket server stopped");
    Ok(())
}
