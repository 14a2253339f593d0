//! Ticket records: a denormalized local copy used for listing.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{ExternalUserId, TicketId};
use serde::{Deserialize, Serialize};

use crate::Result;

/// A persisted ticket.
///
/// The external service stays the source of truth for ticket content;
/// `external_ticket_id` is empty when it could not be read from the
/// creation response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub external_ticket_id: String,
    pub creator_email: String,
    pub creator_external_id: ExternalUserId,
    pub customer_external_id: ExternalUserId,
    pub source_id: i64,
    pub category_id: i64,
    pub type_id: i64,
    pub priority_id: i64,
    pub title: String,
    pub description: String,
    pub created_by: String,
    pub updated_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for [`TicketRepository::create`].
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub external_ticket_id: String,
    pub creator_email: String,
    pub creator_external_id: ExternalUserId,
    pub customer_external_id: ExternalUserId,
    pub source_id: i64,
    pub category_id: i64,
    pub type_id: i64,
    pub priority_id: i64,
    pub title: String,
    pub description: String,
}

impl NewTicket {
    /// Materializes the record with a fresh id and timestamps.
    pub fn into_ticket(self) -> Ticket {
        let now = Utc::now();
        Ticket {
            id: TicketId::new(),
            external_ticket_id: self.external_ticket_id,
            created_by: self.creator_email.clone(),
            updated_by: self.creator_email.clone(),
            creator_email: self.creator_email,
            creator_external_id: self.creator_external_id,
            customer_external_id: self.customer_external_id,
            source_id: self.source_id,
            category_id: self.category_id,
            type_id: self.type_id,
            priority_id: self.priority_id,
            title: self.title,
            description: self.description,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Persistence for tickets.
///
/// `creator_email = None` in the listing operations means "all creators".
/// Listings are ordered newest first.
#[async_trait]
pub trait TicketRepository: Send + Sync {
    async fn create(&self, ticket: NewTicket) -> Result<Ticket>;

    async fn get_by_external_id(&self, external_ticket_id: &str) -> Result<Option<Ticket>>;

    async fn list_by_creator(
        &self,
        creator_email: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Ticket>>;

    async fn count_by_creator(&self, creator_email: Option<&str>) -> Result<i64>;
}

#[async_trait]
impl<T: TicketRepository + ?Sized> TicketRepository for Arc<T> {
    async fn create(&self, ticket: NewTicket) -> Result<Ticket> {
        (**self).create(ticket).await
    }

    async fn get_by_external_id(&self, external_ticket_id: &str) -> Result<Option<Ticket>> {
        (**self).get_by_external_id(external_ticket_id).await
    }

    async fn list_by_creator(
        &self,
        creator_email: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Ticket>> {
        (**self).list_by_creator(creator_email, limit, offset).await
    }

    async fn count_by_creator(&self, creator_email: Option<&str>) -> Result<i64> {
        (**self).count_by_creator(creator_email).await
    }
}
