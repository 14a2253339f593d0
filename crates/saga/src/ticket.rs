//! Ticket creation saga.
//!
//! The service desk is the source of truth for ticket content; the local row
//! is a denormalized copy for listing. A local failure after the remote
//! ticket exists is reported, never undone.

use chrono::Utc;
use common::TicketId;
use serde_json::Value;
use service_desk::{NewRemoteTicket, ServiceDesk, UploadedFile, extract_ticket_id};
use store::{IdentityRepository, NewTicket, TicketRepository};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SagaError};
use crate::state::{CompensationPolicy, TicketStep};
use crate::trace::SagaTrace;

/// Saga name used in logs and metric labels.
pub const SAGA_NAME: &str = "ticket_creation";

/// Ticket creation request.
#[derive(Debug, Clone, Default)]
pub struct TicketInput {
    pub source_id: i64,
    pub category_id: i64,
    pub type_id: i64,
    pub priority_id: i64,
    pub title: String,
    pub description: String,
    /// Unix timestamp of when the issue happened; zero means now.
    pub date_occurred: i64,
    pub attachments: Vec<UploadedFile>,
}

impl TicketInput {
    /// Checks required fields and fills in the occurrence date.
    pub fn validate(mut self) -> Result<TicketInput> {
        let missing: Vec<&str> = [
            ("title", self.title.trim()),
            ("description", self.description.trim()),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(field, _)| field)
        .collect();
        if !missing.is_empty() {
            return Err(SagaError::InvalidInput(format!(
                "required fields missing: {}",
                missing.join(", ")
            )));
        }

        let now = Utc::now().timestamp();
        if self.date_occurred > now {
            return Err(SagaError::InvalidInput(
                "date_ocurred cannot be in the future".to_string(),
            ));
        }
        if self.date_occurred <= 0 {
            self.date_occurred = now;
        }
        Ok(self)
    }
}

/// Outcome of a successful ticket creation.
#[derive(Debug, Clone)]
pub struct CreatedTicket {
    pub ticket_id: TicketId,
    /// Empty when the service desk response carried no recognizable id.
    pub external_ticket_id: String,
    /// The service desk's creation response, passed through to the caller.
    pub remote: Value,
}

/// Creates tickets on the service desk and records them locally.
pub struct TicketSaga<I, T, D> {
    identities: I,
    tickets: T,
    desk: D,
}

impl<I, T, D> TicketSaga<I, T, D>
where
    I: IdentityRepository,
    T: TicketRepository,
    D: ServiceDesk,
{
    pub const POLICY: CompensationPolicy = CompensationPolicy::AcceptAndReconcile;

    pub fn new(identities: I, tickets: T, desk: D) -> Self {
        Self {
            identities,
            tickets,
            desk,
        }
    }

    /// Runs the ticket creation saga on behalf of `creator_email`.
    ///
    /// The creator's service desk id is used as both creator and customer.
    #[tracing::instrument(skip_all, fields(saga = SAGA_NAME, creator = creator_email))]
    pub async fn create(
        &self,
        creator_email: &str,
        input: TicketInput,
        cancel: &CancellationToken,
    ) -> Result<CreatedTicket> {
        let mut trace = SagaTrace::start(SAGA_NAME, Self::POLICY);
        let result = self.run(&mut trace, creator_email, input, cancel).await;
        trace.finish(&result);
        result
    }

    async fn run(
        &self,
        trace: &mut SagaTrace<TicketStep>,
        creator_email: &str,
        input: TicketInput,
        cancel: &CancellationToken,
    ) -> Result<CreatedTicket> {
        trace.enter(TicketStep::ValidateInput);
        let input = input.validate()?;
        trace.complete(TicketStep::ValidateInput);

        trace.enter(TicketStep::ResolveCreator);
        let identity = self
            .identities
            .get_by_email(creator_email)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "failed to load creator identity");
                SagaError::Internal("failed to retrieve user information".to_string())
            })?
            .ok_or_else(|| SagaError::NotFound("user not found".to_string()))?;
        let external_user = identity.external_user_id.ok_or_else(|| {
            tracing::error!("creator has no service desk linkage");
            SagaError::NotFound("user is not linked to the external service".to_string())
        })?;
        trace.complete(TicketStep::ResolveCreator);

        trace.enter(TicketStep::CreateRemoteTicket);
        let has_attachments = !input.attachments.is_empty();
        let remote_ticket = NewRemoteTicket {
            source_id: input.source_id,
            creator_id: external_user,
            customer_id: external_user,
            category_id: input.category_id,
            type_id: input.type_id,
            priority_id: input.priority_id,
            title: input.title.clone(),
            description: input.description.clone(),
            date_occurred: input.date_occurred,
            attachments: input.attachments,
        };
        let remote = match self.desk.create_ticket(&remote_ticket, cancel).await {
            Ok(remote) => remote,
            Err(e) if e.is_cancelled() => {
                return Err(SagaError::Cancelled {
                    step: trace.current_name(),
                });
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    creator_id = %external_user,
                    category_id = input.category_id,
                    type_id = input.type_id,
                    priority_id = input.priority_id,
                    has_attachments,
                    "failed to create ticket on the service desk"
                );
                return Err(SagaError::external(
                    "failed to create ticket in external service",
                    e,
                ));
            }
        };
        trace.complete(TicketStep::CreateRemoteTicket);

        trace.enter(TicketStep::ExtractExternalId);
        let external_ticket_id = extract_ticket_id(&remote).unwrap_or_else(|| {
            tracing::warn!(%remote, "no ticket id in creation response, storing an empty id");
            String::new()
        });
        trace.complete(TicketStep::ExtractExternalId);

        trace.enter(TicketStep::CreateLocalRecord);
        let new_ticket = NewTicket {
            external_ticket_id: external_ticket_id.clone(),
            creator_email: creator_email.to_string(),
            creator_external_id: external_user,
            customer_external_id: external_user,
            source_id: input.source_id,
            category_id: input.category_id,
            type_id: input.type_id,
            priority_id: input.priority_id,
            title: input.title,
            description: input.description,
        };
        let ticket = match self.tickets.create(new_ticket).await {
            Ok(ticket) => ticket,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    external_ticket_id = %external_ticket_id,
                    policy = %Self::POLICY,
                    "CRITICAL: ticket exists on the service desk but not locally - data inconsistency"
                );
                return Err(SagaError::Internal(format!(
                    "ticket created in external service (ID: {external_ticket_id}) but failed to save to local database - data inconsistency detected"
                )));
            }
        };
        trace.complete(TicketStep::CreateLocalRecord);

        tracing::info!(%external_ticket_id, "ticket created");
        Ok(CreatedTicket {
            ticket_id: ticket.id,
            external_ticket_id,
            remote,
        })
    }
}
