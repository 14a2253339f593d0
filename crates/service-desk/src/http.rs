//! [`ServiceDesk`] over the service desk's REST endpoints.

use async_trait::async_trait;
use common::ExternalUserId;
use reqwest::Method;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::desk::extract_user_id;
use crate::{
    DownloadedFile, FilePart, MultipartBody, NewComment, NewRemoteTicket, NewRemoteUser,
    RequestBody, ResilientClient, Result, ServiceDesk, TicketChanges, UploadedFile,
};

const ATTACHMENT_FIELD: &str = "attachments[]";

/// Service desk reached over HTTP through a [`ResilientClient`].
#[derive(Clone)]
pub struct HttpServiceDesk {
    client: ResilientClient,
}

impl HttpServiceDesk {
    pub fn new(client: ResilientClient) -> Self {
        Self { client }
    }

    async fn get(
        &self,
        path: &str,
        params: &[(&str, String)],
        cancel: &CancellationToken,
    ) -> Result<Value> {
        self.client
            .execute(Method::GET, path, params, RequestBody::Empty, cancel)
            .await
    }

    async fn assign(
        &self,
        path: &str,
        entity_id: i64,
        user: ExternalUserId,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let body = json!({ "id": entity_id, "users": [user.get()] });
        self.client
            .execute(Method::POST, path, &[], RequestBody::Json(body), cancel)
            .await?;
        Ok(())
    }
}

fn with_attachments(mut body: MultipartBody, files: &[UploadedFile]) -> MultipartBody {
    for file in files {
        body = body.file(FilePart {
            field: ATTACHMENT_FIELD.to_string(),
            filename: file.filename.clone(),
            content_type: file.content_type.clone(),
            bytes: file.bytes.clone(),
        });
    }
    body
}

/// Normalizes a `user.by` response: the user object, or `None` when the
/// response is empty or carries no usable id.
fn user_from_lookup(value: Value) -> Option<Value> {
    if extract_user_id(&value).is_some() {
        return Some(value);
    }
    match value.get("data") {
        Some(Value::Array(items)) => items.iter().find(|u| extract_user_id(u).is_some()).cloned(),
        Some(user @ Value::Object(_)) if extract_user_id(user).is_some() => Some(user.clone()),
        _ => None,
    }
}

fn ticket_body(ticket: &NewRemoteTicket) -> RequestBody {
    if ticket.attachments.is_empty() {
        return RequestBody::Json(json!({
            "source_id": ticket.source_id,
            "creator_id": ticket.creator_id.get(),
            "customer_id": ticket.customer_id.get(),
            "category_id": ticket.category_id,
            "type_id": ticket.type_id,
            "priority_id": ticket.priority_id,
            "title": ticket.title,
            "description": ticket.description,
            "date": ticket.date_occurred,
        }));
    }

    let body = MultipartBody::new()
        .text("source_id", ticket.source_id)
        .text("creator_id", ticket.creator_id)
        .text("customer_id", ticket.customer_id)
        .text("category_id", ticket.category_id)
        .text("type_id", ticket.type_id)
        .text("priority_id", ticket.priority_id)
        .text("title", &ticket.title)
        .text("description", &ticket.description)
        .text("date", ticket.date_occurred);
    RequestBody::Multipart(with_attachments(body, &ticket.attachments))
}

fn update_body(ticket_id: i64, changes: &TicketChanges) -> RequestBody {
    let mut body = MultipartBody::new().text("id", ticket_id);
    let numeric = [
        ("source_id", changes.source_id),
        ("creator_id", changes.creator_id),
        ("customer_id", changes.customer_id),
        ("category_id", changes.category_id),
        ("type_id", changes.type_id),
        ("priority_id", changes.priority_id),
        ("date", changes.date_occurred),
    ];
    for (name, value) in numeric {
        if let Some(value) = value.filter(|v| *v > 0) {
            body = body.text(name, value);
        }
    }
    if let Some(title) = changes.title.as_deref().filter(|t| !t.is_empty()) {
        body = body.text("title", title);
    }
    if let Some(description) = changes.description.as_deref().filter(|d| !d.is_empty()) {
        body = body.text("description", description);
    }
    RequestBody::Multipart(body)
}

#[async_trait]
impl ServiceDesk for HttpServiceDesk {
    async fn create_user(
        &self,
        user: &NewRemoteUser,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let body = json!({
            "name": user.name,
            "lastname": user.last_name,
            "email": user.email,
            "pass": user.password,
        });
        self.client
            .execute(Method::POST, "user", &[], RequestBody::Json(body), cancel)
            .await
    }

    async fn delete_user(&self, id: ExternalUserId, cancel: &CancellationToken) -> Result<()> {
        self.client
            .execute(
                Method::DELETE,
                "user",
                &[("id", id.to_string())],
                RequestBody::Empty,
                cancel,
            )
            .await?;
        Ok(())
    }

    async fn get_user(&self, id: i64, cancel: &CancellationToken) -> Result<Value> {
        self.get("user", &[("id", id.to_string())], cancel).await
    }

    async fn get_user_by_email(
        &self,
        email: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Value>> {
        let value = self
            .get("user.by", &[("email", email.to_string())], cancel)
            .await?;
        Ok(user_from_lookup(value))
    }

    async fn assign_user_to_company(
        &self,
        company_id: i64,
        user: ExternalUserId,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.assign("companies.users", company_id, user, cancel).await
    }

    async fn assign_user_to_group(
        &self,
        group_id: i64,
        user: ExternalUserId,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.assign("groups.users", group_id, user, cancel).await
    }

    async fn assign_user_to_location(
        &self,
        location_id: i64,
        user: ExternalUserId,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.assign("locations.users", location_id, user, cancel)
            .await
    }

    async fn create_ticket(
        &self,
        ticket: &NewRemoteTicket,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        self.client
            .execute(Method::POST, "incident", &[], ticket_body(ticket), cancel)
            .await
    }

    async fn update_ticket(
        &self,
        ticket_id: i64,
        changes: &TicketChanges,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        self.client
            .execute(
                Method::PUT,
                "incident",
                &[],
                update_body(ticket_id, changes),
                cancel,
            )
            .await
    }

    async fn ticket_detail(&self, ticket_id: &str, cancel: &CancellationToken) -> Result<Value> {
        self.get("incident", &[("id", ticket_id.to_string())], cancel)
            .await
    }

    async fn ticket_comments(
        &self,
        request_id: i64,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        self.get(
            "incident.comment",
            &[("request_id", request_id.to_string())],
            cancel,
        )
        .await
    }

    async fn add_ticket_comment(
        &self,
        comment: &NewComment,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let body = if comment.attachments.is_empty() {
            RequestBody::Json(json!({
                "request_id": comment.request_id,
                "author_id": comment.author_id.get(),
                "comment": comment.comment,
            }))
        } else {
            let body = MultipartBody::new()
                .text("request_id", comment.request_id)
                .text("author_id", comment.author_id)
                .text("comment", &comment.comment);
            RequestBody::Multipart(with_attachments(body, &comment.attachments))
        };
        self.client
            .execute(Method::POST, "incident.comment", &[], body, cancel)
            .await
    }

    async fn attachment(
        &self,
        attachment_id: &str,
        cancel: &CancellationToken,
    ) -> Result<DownloadedFile> {
        self.client
            .execute_bytes(
                "incident.attachment",
                &[("id", attachment_id.to_string())],
                cancel,
            )
            .await
    }

    async fn attachment_info(
        &self,
        attachment_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let value = self
            .get(
                "incident.attachment",
                &[("id", attachment_id.to_string())],
                cancel,
            )
            .await?;
        Ok(match value.get("data") {
            Some(info @ Value::Object(_)) => info.clone(),
            _ => value,
        })
    }

    async fn accept_solution(
        &self,
        request_id: i64,
        rating: u8,
        comment: &str,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let body = MultipartBody::new()
            .text("id", request_id)
            .text("rating", rating)
            .text("comment", comment);
        self.client
            .execute(
                Method::PUT,
                "incident.solution.accept",
                &[],
                RequestBody::Multipart(body),
                cancel,
            )
            .await
    }

    async fn reject_solution(
        &self,
        request_id: i64,
        comment: &str,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let body = MultipartBody::new()
            .text("id", request_id)
            .text("comment", comment);
        self.client
            .execute(
                Method::PUT,
                "incident.solution.reject",
                &[],
                RequestBody::Multipart(body),
                cancel,
            )
            .await
    }

    async fn categories(&self, cancel: &CancellationToken) -> Result<Value> {
        self.get("categories", &[], cancel).await
    }

    async fn articles_by_category(
        &self,
        category_id: i64,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        self.get(
            "kb.articles.by.category",
            &[("category_id", category_id.to_string())],
            cancel,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_from_lookup() {
        assert!(user_from_lookup(json!({})).is_none());
        assert!(user_from_lookup(json!({"data": []})).is_none());
        assert!(user_from_lookup(json!({"status": "not found"})).is_none());

        let direct = user_from_lookup(json!({"id": 5, "email": "a@x.com"})).unwrap();
        assert_eq!(direct["id"], 5);

        let wrapped = user_from_lookup(json!({"data": [{"id": 6}]})).unwrap();
        assert_eq!(wrapped["id"], 6);
    }

    #[test]
    fn test_ticket_body_switches_on_attachments() {
        let mut ticket = NewRemoteTicket {
            source_id: 2,
            creator_id: ExternalUserId::new(10).unwrap(),
            customer_id: ExternalUserId::new(10).unwrap(),
            category_id: 115,
            type_id: 1,
            priority_id: 3,
            title: "Laptop".to_string(),
            description: "Won't boot".to_string(),
            date_occurred: 1_700_000_000,
            attachments: Vec::new(),
        };

        let RequestBody::Json(json_body) = ticket_body(&ticket) else {
            panic!("expected JSON body without attachments");
        };
        assert_eq!(json_body["creator_id"], 10);
        assert_eq!(json_body["date"], 1_700_000_000);

        ticket.attachments.push(UploadedFile {
            filename: "photo.png".to_string(),
            content_type: Some("image/png".to_string()),
            bytes: vec![1, 2, 3],
        });
        let RequestBody::Multipart(multipart) = ticket_body(&ticket) else {
            panic!("expected multipart body with attachments");
        };
        assert_eq!(multipart.files().len(), 1);
        assert_eq!(multipart.files()[0].field, "attachments[]");
        assert!(multipart.fields().iter().any(|(k, v)| k == "title" && v == "Laptop"));
    }

    #[test]
    fn test_update_body_sends_only_provided_fields() {
        let changes = TicketChanges {
            priority_id: Some(5),
            title: Some("Urgent now".to_string()),
            description: Some(String::new()),
            ..Default::default()
        };
        let RequestBody::Multipart(body) = update_body(12, &changes) else {
            panic!("expected multipart body");
        };
        let names: Vec<_> = body.fields().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, ["id", "priority_id", "title"]);
    }
}
