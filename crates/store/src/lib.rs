//! Local store for the help-desk gateway.
//!
//! Identity and ticket records live in a relational database. The sagas
//! depend only on the repository traits and the [`StoreError`] taxonomy,
//! in particular on [`StoreError::DuplicateKey`] being reported atomically
//! by the store when two registrations race for the same email.

pub mod error;
pub mod identity;
pub mod memory;
pub mod postgres;
pub mod ticket;

pub use error::{Result, StoreError};
pub use identity::{Identity, IdentityRepository, NewIdentity};
pub use memory::{CreateFailure, InMemoryIdentityRepository, InMemoryTicketRepository};
pub use postgres::{PostgresIdentityRepository, PostgresTicketRepository, run_migrations};
pub use ticket::{NewTicket, Ticket, TicketRepository};
