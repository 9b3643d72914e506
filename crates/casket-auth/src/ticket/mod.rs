//! Ticket model: ids, kinds, lifecycle state and expiration policies.

pub mod expiration;
pub mod id;
pub mod model;

pub use expiration::{ExpirationPolicy, TicketUsage};
pub use id::{PGT_IOU_PREFIX, TicketId, TicketIdGenerator};
pub use model::{Service, Ticket, TicketKind, TicketState, TicketStatus};
