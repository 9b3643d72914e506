//! CAS core: the operations the protocol layer drives.

pub mod assertion;
pub mod service;

pub use assertion::{Assertion, ProxyGrantingTicket};
pub use service::CentralAuthenticationService;
