//! Ticket operations that pass through to the service desk.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use service_desk::{
    DownloadedFile, NewComment, ServiceDesk, ServiceDeskError, TicketChanges, UploadedFile,
};
use store::{IdentityRepository, TicketRepository};
use tokio_util::sync::CancellationToken;

use crate::catalog::{AllowedCategories, Reference, STATUSES, TICKET_META, TicketMeta, status_name};
use crate::error::{Result, TicketingError};

/// Page size used when the caller asks for less than one ticket.
pub const DEFAULT_PAGE_SIZE: i64 = 2;

/// Largest page a caller may ask for.
pub const MAX_PAGE_SIZE: i64 = 100;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Position of a page within a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    /// Clamps a requested page and page size into range.
    pub fn normalize(page: i64, limit: i64) -> (i64, i64) {
        let page = page.max(1);
        let limit = if limit < 1 {
            DEFAULT_PAGE_SIZE
        } else {
            limit.min(MAX_PAGE_SIZE)
        };
        (page, limit)
    }

    /// There is always at least one page, even for an empty listing.
    pub fn new(page: i64, limit: i64, total: i64) -> Self {
        let total_pages = ((total + limit - 1) / limit).max(1);
        Self {
            page,
            limit,
            total,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }

    /// Rows to skip; saturates for pages far past the end.
    fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

/// One page of a creator's tickets, enriched from the service desk.
#[derive(Debug, Clone, Serialize)]
pub struct TicketPage {
    pub data: Vec<Value>,
    pub pagination: Pagination,
}

/// Service for ticket reads and updates after creation.
///
/// Ticket content lives on the service desk; the local store is only
/// consulted to list a creator's tickets and to map callers to their
/// service desk ids.
pub struct TicketService<I, T, D> {
    identities: I,
    tickets: T,
    desk: D,
    allowed_categories: AllowedCategories,
}

impl<I, T, D> TicketService<I, T, D>
where
    I: IdentityRepository,
    T: TicketRepository,
    D: ServiceDesk,
{
    pub fn new(identities: I, tickets: T, desk: D, allowed_categories: AllowedCategories) -> Self {
        Self {
            identities,
            tickets,
            desk,
            allowed_categories,
        }
    }

    /// Lists the tickets `creator_email` opened, newest first.
    ///
    /// Tickets without a service desk id, or whose detail cannot be fetched,
    /// are left out of the page but still count towards the total.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn list(
        &self,
        creator_email: &str,
        page: i64,
        limit: i64,
        cancel: &CancellationToken,
    ) -> Result<TicketPage> {
        let (page, limit) = Pagination::normalize(page, limit);

        let total = self
            .tickets
            .count_by_creator(Some(creator_email))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "failed to count tickets");
                TicketingError::Internal("failed to count tickets from database".to_string())
            })?;
        let pagination = Pagination::new(page, limit, total);

        let local = self
            .tickets
            .list_by_creator(Some(creator_email), limit, pagination.offset())
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "failed to list tickets");
                TicketingError::Internal("failed to fetch tickets from database".to_string())
            })?;

        let mut data = Vec::with_capacity(local.len());
        for ticket in local {
            let external_id = ticket.external_ticket_id;
            if external_id.is_empty() {
                tracing::warn!(ticket_id = %ticket.id, "skipping ticket without service desk id");
                continue;
            }

            let mut detail = match self.desk.ticket_detail(&external_id, cancel).await {
                Ok(detail) => detail,
                Err(ServiceDeskError::Cancelled) => return Err(TicketingError::Cancelled),
                Err(e) => {
                    tracing::warn!(error = %e, %external_id, "failed to fetch ticket detail, skipping");
                    continue;
                }
            };
            with_status_name(&mut detail);
            if let Value::Object(fields) = &mut detail {
                fields.insert(
                    "wrk_ticket_id".to_string(),
                    Value::String(format!("WRK-#{external_id}")),
                );
                fields.insert("inv_gate_id".to_string(), Value::String(external_id));
            }
            data.push(detail);
        }

        Ok(TicketPage { data, pagination })
    }

    /// Fetches a ticket's detail with its status name filled in.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn detail(&self, ticket_id: &str, cancel: &CancellationToken) -> Result<Value> {
        if ticket_id.trim().is_empty() {
            return Err(TicketingError::invalid("ticket id is required"));
        }

        let mut detail = self
            .desk
            .ticket_detail(ticket_id, cancel)
            .await
            .map_err(|e| {
                remote_failure(
                    "ticket_detail",
                    "failed to fetch ticket detail from external service",
                    e,
                )
            })?;
        with_status_name(&mut detail);
        Ok(detail)
    }

    /// Applies a partial update; only the fields that are set are sent.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn update(
        &self,
        ticket_id: i64,
        changes: &TicketChanges,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        if ticket_id <= 0 {
            return Err(TicketingError::invalid(
                "ticket id must be a positive integer",
            ));
        }
        if changes
            .date_occurred
            .is_some_and(|date| date > Utc::now().timestamp())
        {
            return Err(TicketingError::invalid(
                "date_ocurred cannot be in the future",
            ));
        }

        self.desk
            .update_ticket(ticket_id, changes, cancel)
            .await
            .map_err(|e| {
                remote_failure(
                    "update_ticket",
                    "failed to update ticket in external service",
                    e,
                )
            })
    }

    #[tracing::instrument(skip(self, cancel))]
    pub async fn comments(&self, request_id: i64, cancel: &CancellationToken) -> Result<Value> {
        self.desk
            .ticket_comments(request_id, cancel)
            .await
            .map_err(|e| remote_failure("ticket_comments", "failed to fetch ticket comments", e))
    }

    /// Posts a comment authored by `author_email`'s service desk user.
    #[tracing::instrument(skip(self, comment, attachments, cancel), fields(attachments = attachments.len()))]
    pub async fn add_comment(
        &self,
        author_email: &str,
        request_id: i64,
        comment: String,
        attachments: Vec<UploadedFile>,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        if comment.trim().is_empty() {
            return Err(TicketingError::invalid("comment is required"));
        }

        let author = self
            .identities
            .get_by_email(author_email)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "failed to load comment author");
                TicketingError::Internal("failed to retrieve user information".to_string())
            })?
            .ok_or_else(|| TicketingError::NotFound("user not found".to_string()))?;
        let author_id = author.external_user_id.ok_or_else(|| {
            TicketingError::NotFound("user is not linked to the external service".to_string())
        })?;

        let comment = NewComment {
            request_id,
            author_id,
            comment,
            attachments,
        };
        self.desk
            .add_ticket_comment(&comment, cancel)
            .await
            .map_err(|e| remote_failure("add_ticket_comment", "failed to add comment to ticket", e))
    }

    /// Downloads an attachment; a missing content type becomes
    /// `application/octet-stream`.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn attachment(
        &self,
        attachment_id: &str,
        cancel: &CancellationToken,
    ) -> Result<DownloadedFile> {
        if attachment_id.trim().is_empty() {
            return Err(TicketingError::invalid("attachment id is required"));
        }

        let mut file = self
            .desk
            .attachment(attachment_id, cancel)
            .await
            .map_err(|e| remote_failure("attachment", "failed to fetch attachment", e))?;
        if file.content_type.as_deref().is_none_or(str::is_empty) {
            file.content_type = Some(DEFAULT_CONTENT_TYPE.to_string());
        }
        Ok(file)
    }

    #[tracing::instrument(skip(self, cancel))]
    pub async fn attachment_info(
        &self,
        attachment_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        if attachment_id.trim().is_empty() {
            return Err(TicketingError::invalid("attachment id is required"));
        }

        self.desk
            .attachment_info(attachment_id, cancel)
            .await
            .map_err(|e| remote_failure("attachment_info", "failed to fetch attachment info", e))
    }

    /// Accepts the proposed solution with a rating from 1 to 5.
    #[tracing::instrument(skip(self, comment, cancel))]
    pub async fn accept_solution(
        &self,
        request_id: i64,
        rating: i64,
        comment: &str,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        if request_id <= 0 {
            return Err(TicketingError::invalid(
                "request_id must be a positive integer",
            ));
        }
        let rating = u8::try_from(rating)
            .ok()
            .filter(|r| (1..=5).contains(r))
            .ok_or_else(|| TicketingError::invalid("rating must be between 1 and 5"))?;
        if comment.trim().is_empty() {
            return Err(TicketingError::invalid("comment is required"));
        }

        self.desk
            .accept_solution(request_id, rating, comment, cancel)
            .await
            .map_err(|e| {
                remote_failure(
                    "accept_solution",
                    "failed to accept ticket solution in external service",
                    e,
                )
            })
    }

    #[tracing::instrument(skip(self, comment, cancel))]
    pub async fn reject_solution(
        &self,
        request_id: i64,
        comment: &str,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        if request_id <= 0 {
            return Err(TicketingError::invalid(
                "request_id must be a positive integer",
            ));
        }
        if comment.trim().is_empty() {
            return Err(TicketingError::invalid("comment is required"));
        }

        self.desk
            .reject_solution(request_id, comment, cancel)
            .await
            .map_err(|e| {
                remote_failure(
                    "reject_solution",
                    "failed to reject ticket solution in external service",
                    e,
                )
            })
    }

    /// Service desk categories restricted to the allowed ids.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn categories(&self, cancel: &CancellationToken) -> Result<Vec<Value>> {
        let response = self.desk.categories(cancel).await.map_err(|e| {
            remote_failure(
                "categories",
                "failed to fetch categories from external service",
                e,
            )
        })?;
        Ok(self.allowed_categories.filter(&response))
    }

    pub fn ticket_meta(&self) -> TicketMeta {
        TICKET_META
    }

    pub fn statuses(&self) -> &'static [Reference] {
        STATUSES
    }

    /// Knowledge base articles in a category.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn articles(&self, category_id: i64, cancel: &CancellationToken) -> Result<Value> {
        if category_id <= 0 {
            return Err(TicketingError::invalid(
                "category_id must be a positive integer",
            ));
        }

        self.desk
            .articles_by_category(category_id, cancel)
            .await
            .map_err(|e| {
                remote_failure(
                    "articles_by_category",
                    "failed to fetch articles from external service",
                    e,
                )
            })
    }

    /// A user record as the service desk holds it.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn external_user(&self, user_id: i64, cancel: &CancellationToken) -> Result<Value> {
        if user_id <= 0 {
            return Err(TicketingError::invalid("user_id must be a positive integer"));
        }

        self.desk.get_user(user_id, cancel).await.map_err(|e| {
            remote_failure(
                "get_user",
                "failed to fetch user from external service",
                e,
            )
        })
    }
}

fn with_status_name(detail: &mut Value) {
    let Value::Object(fields) = detail else {
        return;
    };
    if let Some(status_id) = fields.get("status_id") {
        let name = status_name(status_id).unwrap_or_default();
        fields.insert("status".to_string(), Value::String(name.to_string()));
    }
}

fn remote_failure(
    operation: &'static str,
    message: &'static str,
    error: ServiceDeskError,
) -> TicketingError {
    if !error.is_cancelled() {
        tracing::error!(error = %error, operation, "{message}");
        metrics::counter!("ticketing_remote_failures_total", "operation" => operation)
            .increment(1);
    }
    TicketingError::remote(message, error)
}
