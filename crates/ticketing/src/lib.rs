//! Ticket operations after creation.
//!
//! Creation goes through the ticket saga; everything else here reads from or
//! writes to the service desk directly:
//! - paginated listing of a creator's tickets, enriched with live detail
//! - detail, partial update, comments and attachments
//! - accepting or rejecting a proposed solution
//! - reference data: categories, ticket types, priorities and statuses

pub mod catalog;
pub mod error;
pub mod service;

pub use catalog::{
    AllowedCategories, PRIORITIES, Reference, STATUSES, TICKET_META, TICKET_TYPES, TicketMeta,
    status_name,
};
pub use error::{Result, TicketingError};
pub use service::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, Pagination, TicketPage, TicketService};
