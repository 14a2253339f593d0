//! The service desk as a collaborator: the operations the sagas and the
//! ticketing service call, independent of transport.

use std::sync::Arc;

use async_trait::async_trait;
use common::ExternalUserId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{DownloadedFile, Result};

/// Identity to create on the service desk. The password is sent in plaintext
/// over the authenticated channel; it never reaches the local store.
#[derive(Clone)]
pub struct NewRemoteUser {
    pub name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for NewRemoteUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewRemoteUser")
            .field("name", &self.name)
            .field("last_name", &self.last_name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A file supplied by the caller for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Ticket to open on the service desk.
#[derive(Debug, Clone)]
pub struct NewRemoteTicket {
    pub source_id: i64,
    pub creator_id: ExternalUserId,
    pub customer_id: ExternalUserId,
    pub category_id: i64,
    pub type_id: i64,
    pub priority_id: i64,
    pub title: String,
    pub description: String,
    /// Unix timestamp of when the issue occurred.
    pub date_occurred: i64,
    pub attachments: Vec<UploadedFile>,
}

/// Partial ticket update; only the fields that are set are sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, rename = "date_ocurred", skip_serializing_if = "Option::is_none")]
    pub date_occurred: Option<i64>,
}

/// Comment to post on a ticket.
#[derive(Debug, Clone)]
pub struct NewComment {
    pub request_id: i64,
    pub author_id: ExternalUserId,
    pub comment: String,
    pub attachments: Vec<UploadedFile>,
}

/// Operations on the external service desk.
///
/// Every call takes the caller's cancellation token; implementations return
/// [`ServiceDeskError::Cancelled`](crate::ServiceDeskError::Cancelled) once it
/// fires.
#[async_trait]
pub trait ServiceDesk: Send + Sync {
    /// Creates a user and returns the raw response, which carries the new `id`.
    async fn create_user(&self, user: &NewRemoteUser, cancel: &CancellationToken)
    -> Result<Value>;

    async fn delete_user(&self, id: ExternalUserId, cancel: &CancellationToken) -> Result<()>;

    async fn get_user(&self, id: i64, cancel: &CancellationToken) -> Result<Value>;

    /// Looks a user up by email; `None` when the service knows no such user.
    async fn get_user_by_email(
        &self,
        email: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Value>>;

    async fn assign_user_to_company(
        &self,
        company_id: i64,
        user: ExternalUserId,
        cancel: &CancellationToken,
    ) -> Result<()>;

    async fn assign_user_to_group(
        &self,
        group_id: i64,
        user: ExternalUserId,
        cancel: &CancellationToken,
    ) -> Result<()>;

    async fn assign_user_to_location(
        &self,
        location_id: i64,
        user: ExternalUserId,
        cancel: &CancellationToken,
    ) -> Result<()>;

    async fn create_ticket(
        &self,
        ticket: &NewRemoteTicket,
        cancel: &CancellationToken,
    ) -> Result<Value>;

    async fn update_ticket(
        &self,
        ticket_id: i64,
        changes: &TicketChanges,
        cancel: &CancellationToken,
    ) -> Result<Value>;

    async fn ticket_detail(&self, ticket_id: &str, cancel: &CancellationToken) -> Result<Value>;

    async fn ticket_comments(&self, request_id: i64, cancel: &CancellationToken)
    -> Result<Value>;

    async fn add_ticket_comment(
        &self,
        comment: &NewComment,
        cancel: &CancellationToken,
    ) -> Result<Value>;

    /// Downloads an attachment's content.
    async fn attachment(
        &self,
        attachment_id: &str,
        cancel: &CancellationToken,
    ) -> Result<DownloadedFile>;

    /// Fetches an attachment's metadata instead of its content.
    async fn attachment_info(
        &self,
        attachment_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Value>;

    async fn accept_solution(
        &self,
        request_id: i64,
        rating: u8,
        comment: &str,
        cancel: &CancellationToken,
    ) -> Result<Value>;

    async fn reject_solution(
        &self,
        request_id: i64,
        comment: &str,
        cancel: &CancellationToken,
    ) -> Result<Value>;

    async fn categories(&self, cancel: &CancellationToken) -> Result<Value>;

    async fn articles_by_category(
        &self,
        category_id: i64,
        cancel: &CancellationToken,
    ) -> Result<Value>;
}

#[async_trait]
impl<T: ServiceDesk + ?Sized> ServiceDesk for Arc<T> {
    async fn create_user(
        &self,
        user: &NewRemoteUser,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        (**self).create_user(user, cancel).await
    }

    async fn delete_user(&self, id: ExternalUserId, cancel: &CancellationToken) -> Result<()> {
        (**self).delete_user(id, cancel).await
    }

    async fn get_user(&self, id: i64, cancel: &CancellationToken) -> Result<Value> {
        (**self).get_user(id, cancel).await
    }

    async fn get_user_by_email(
        &self,
        email: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Value>> {
        (**self).get_user_by_email(email, cancel).await
    }

    async fn assign_user_to_company(
        &self,
        company_id: i64,
        user: ExternalUserId,
        cancel: &CancellationToken,
    ) -> Result<()> {
        (**self).assign_user_to_company(company_id, user, cancel).await
    }

    async fn assign_user_to_group(
        &self,
        group_id: i64,
        user: ExternalUserId,
        cancel: &CancellationToken,
    ) -> Result<()> {
        (**self).assign_user_to_group(group_id, user, cancel).await
    }

    async fn assign_user_to_location(
        &self,
        location_id: i64,
        user: ExternalUserId,
        cancel: &CancellationToken,
    ) -> Result<()> {
        (**self)
            .assign_user_to_location(location_id, user, cancel)
            .await
    }

    async fn create_ticket(
        &self,
        ticket: &NewRemoteTicket,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        (**self).create_ticket(ticket, cancel).await
    }

    async fn update_ticket(
        &self,
        ticket_id: i64,
        changes: &TicketChanges,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        (**self).update_ticket(ticket_id, changes, cancel).await
    }

    async fn ticket_detail(&self, ticket_id: &str, cancel: &CancellationToken) -> Result<Value> {
        (**self).ticket_detail(ticket_id, cancel).await
    }

    async fn ticket_comments(
        &self,
        request_id: i64,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        (**self).ticket_comments(request_id, cancel).await
    }

    async fn add_ticket_comment(
        &self,
        comment: &NewComment,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        (**self).add_ticket_comment(comment, cancel).await
    }

    async fn attachment(
        &self,
        attachment_id: &str,
        cancel: &CancellationToken,
    ) -> Result<DownloadedFile> {
        (**self).attachment(attachment_id, cancel).await
    }

    async fn attachment_info(
        &self,
        attachment_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        (**self).attachment_info(attachment_id, cancel).await
    }

    async fn accept_solution(
        &self,
        request_id: i64,
        rating: u8,
        comment: &str,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        (**self)
            .accept_solution(request_id, rating, comment, cancel)
            .await
    }

    async fn reject_solution(
        &self,
        request_id: i64,
        comment: &str,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        (**self).reject_solution(request_id, comment, cancel).await
    }

    async fn categories(&self, cancel: &CancellationToken) -> Result<Value> {
        (**self).categories(cancel).await
    }

    async fn articles_by_category(
        &self,
        category_id: i64,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        (**self).articles_by_category(category_id, cancel).await
    }
}

/// Reads a positive integer `id` from a service desk response.
pub fn extract_user_id(response: &Value) -> Option<ExternalUserId> {
    response.get("id").and_then(as_i64).and_then(ExternalUserId::new)
}

/// Reads the ticket id from a creation response: the first of `id`,
/// `request_id` and `incident_id`, as a string.
pub fn extract_ticket_id(response: &Value) -> Option<String> {
    ["id", "request_id", "incident_id"]
        .iter()
        .filter_map(|key| response.get(*key))
        .find_map(|value| match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => n
                .as_i64()
                .map(|v| v.to_string())
                .or_else(|| n.as_f64().map(|v| format!("{v:.0}"))),
            _ => None,
        })
}

/// Numbers arrive as integers, floats or numeric strings.
pub(crate) fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
