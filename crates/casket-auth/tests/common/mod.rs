//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use argon2::password_hash::{rand_core::OsRng, PasswordHasher, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use casket_auth::authentication::{AcceptUsersAuthenticationHandler, UserAccount};
use casket_auth::prelude::*;
use casket_auth::SimpleAttributePrincipalFactory;

pub const APP: &str = "https://app.example.org/login";
pub const OTHER_APP: &str = "https://other.example.org/login";

/// Argon2 hash with minimal cost parameters.
pub fn quick_hash(password: &str) -> String {
    let params = Params::new(8, 1, 1, None).unwrap();
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let salt = SaltString::generate(&mut OsRng);
    argon2
        .hash_password(password.as_bytes(), &salt)
        .unwrap()
        .to_string()
}

/// Accounts `alice`/`alice-pw` and `bob`/`bob-pw`.
pub fn accounts() -> HashMap<String, UserAccount> {
    HashMap::from([
        ("alice".to_string(), UserAccount::new(quick_hash("alice-pw"))),
        ("bob".to_string(), UserAccount::new(quick_hash("bob-pw"))),
    ])
}

pub fn manager(config: &CasConfig) -> AuthenticationManager {
    AuthenticationManager::new(&config.authentication).with_handler(Arc::new(
        AcceptUsersAuthenticationHandler::new(accounts(), Arc::new(SimpleAttributePrincipalFactory)),
    ))
}

pub fn cas_with(config: CasConfig) -> CentralAuthenticationService {
    CentralAuthenticationService::new(&config, TicketRegistry::in_memory(), manager(&config))
        .unwrap()
}

pub fn cas() -> CentralAuthenticationService {
    cas_with(CasConfig::default())
}

pub async fn login(cas: &CentralAuthenticationService, username: &str) -> TicketId {
    let mut credential = Credential::username_password(username, format!("{username}-pw"));
    cas.create_ticket_granting_ticket(&mut credential)
        .await
        .unwrap()
}

pub fn service(url: &str) -> Service {
    Service::new(url)
}

pub fn ticket_kind(err: &CasError) -> InvalidTicketKind {
    err.invalid_ticket_kind()
        .unwrap_or_else(|| panic!("expected an invalid ticket error, got {err:?}"))
}
