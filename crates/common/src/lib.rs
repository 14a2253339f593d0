//! Shared types for the help-desk gateway.
//!
//! Identifiers for local records, the identifier assigned by the external
//! service desk, the error taxonomy every crate reports through, and the
//! input checks shared by registration and login.

pub mod error;
pub mod types;
pub mod validation;

pub use error::ErrorKind;
pub use types::{ExternalUserId, IdentityId, TicketId};
