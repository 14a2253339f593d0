//! In-memory service desk for tests and local runs.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use async_trait::async_trait;
use common::ExternalUserId;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::{
    DownloadedFile, NewComment, NewRemoteTicket, NewRemoteUser, Result, ServiceDesk,
    ServiceDeskError, TicketChanges,
};

/// Scope a user was assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Company,
    Group,
    Location,
}

#[derive(Debug, Default)]
struct InMemoryServiceDeskState {
    users: HashMap<i64, Value>,
    next_user_id: i64,
    tickets: HashMap<i64, Value>,
    created_tickets: Vec<NewRemoteTicket>,
    next_ticket_id: i64,
    comments: HashMap<i64, Vec<Value>>,
    attachments: HashMap<String, DownloadedFile>,
    categories: Vec<Value>,
    assignments: Vec<(Scope, i64, ExternalUserId)>,

    create_user_response: Option<Value>,
    create_ticket_response: Option<Value>,
    allow_duplicate_emails: bool,
    fail_lookup: Option<u16>,
    fail_create_user: Option<u16>,
    fail_delete_user: Option<u16>,
    fail_assign: Option<(Scope, u16)>,
    cancel_on_assign: Option<Scope>,
    fail_create_ticket: Option<u16>,

    lookup_calls: usize,
    create_user_calls: usize,
    delete_user_calls: usize,
    assign_calls: usize,
    create_ticket_calls: usize,
}

fn injected(status: u16) -> ServiceDeskError {
    ServiceDeskError::Status {
        status,
        body: "injected failure".to_string(),
    }
}

fn check_cancel(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(ServiceDeskError::Cancelled);
    }
    Ok(())
}

fn not_found(what: &str) -> ServiceDeskError {
    ServiceDeskError::Status {
        status: 404,
        body: format!("{what} not found"),
    }
}

/// Service desk fake with call counters and failure switches.
///
/// Emails are unique, like on the real service. Failures are injected as
/// HTTP status codes so callers see the same error shapes the HTTP client
/// produces.
#[derive(Debug, Clone, Default)]
pub struct InMemoryServiceDesk {
    state: Arc<RwLock<InMemoryServiceDeskState>>,
}

impl InMemoryServiceDesk {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> RwLockWriteGuard<'_, InMemoryServiceDeskState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the `create_user` response, e.g. with one lacking an `id`.
    pub fn set_create_user_response(&self, response: Option<Value>) {
        self.state().create_user_response = response;
    }

    /// Replaces the `create_ticket` response, e.g. with one carrying no id.
    pub fn set_create_ticket_response(&self, response: Option<Value>) {
        self.state().create_ticket_response = response;
    }

    /// Lets `create_user` accept an email that is already taken, like a
    /// service without a uniqueness constraint.
    pub fn set_allow_duplicate_emails(&self, allow: bool) {
        self.state().allow_duplicate_emails = allow;
    }

    pub fn set_fail_lookup(&self, status: Option<u16>) {
        self.state().fail_lookup = status;
    }

    pub fn set_fail_create_user(&self, status: Option<u16>) {
        self.state().fail_create_user = status;
    }

    pub fn set_fail_delete_user(&self, status: Option<u16>) {
        self.state().fail_delete_user = status;
    }

    /// Fails assignment to the given scope.
    pub fn set_fail_assign(&self, failure: Option<(Scope, u16)>) {
        self.state().fail_assign = failure;
    }

    /// Cancels the caller's token when assignment to `scope` is attempted,
    /// as if the caller gave up while that call was in flight.
    pub fn set_cancel_on_assign(&self, scope: Option<Scope>) {
        self.state().cancel_on_assign = scope;
    }

    pub fn set_fail_create_ticket(&self, status: Option<u16>) {
        self.state().fail_create_ticket = status;
    }

    /// Seeds a user as if it had been created out of band.
    pub fn insert_user(&self, email: &str) -> ExternalUserId {
        let mut state = self.state();
        state.next_user_id += 1;
        let id = state.next_user_id;
        state.users.insert(id, json!({ "id": id, "email": email }));
        ExternalUserId::new(id).unwrap_or_else(|| unreachable!("ids start at 1"))
    }

    /// Seeds a ticket detail under the given id.
    pub fn insert_ticket(&self, id: i64, detail: Value) {
        self.state().tickets.insert(id, detail);
    }

    pub fn insert_attachment(&self, id: &str, file: DownloadedFile) {
        self.state().attachments.insert(id.to_string(), file);
    }

    pub fn set_categories(&self, categories: Vec<Value>) {
        self.state().categories = categories;
    }

    pub fn user_count(&self) -> usize {
        self.state().users.len()
    }

    pub fn has_user(&self, id: ExternalUserId) -> bool {
        self.state().users.contains_key(&id.get())
    }

    pub fn assignments(&self) -> Vec<(Scope, i64, ExternalUserId)> {
        self.state().assignments.clone()
    }

    /// Tickets received by `create_ticket`, in order.
    pub fn created_tickets(&self) -> Vec<NewRemoteTicket> {
        self.state().created_tickets.clone()
    }

    pub fn lookup_calls(&self) -> usize {
        self.state().lookup_calls
    }

    pub fn create_user_calls(&self) -> usize {
        self.state().create_user_calls
    }

    pub fn delete_user_calls(&self) -> usize {
        self.state().delete_user_calls
    }

    pub fn assign_calls(&self) -> usize {
        self.state().assign_calls
    }

    pub fn create_ticket_calls(&self) -> usize {
        self.state().create_ticket_calls
    }

    fn assign(
        &self,
        scope: Scope,
        entity_id: i64,
        user: ExternalUserId,
        cancel: &CancellationToken,
    ) -> Result<()> {
        check_cancel(cancel)?;
        let mut state = self.state();
        state.assign_calls += 1;
        if state.cancel_on_assign == Some(scope) {
            cancel.cancel();
            return Err(ServiceDeskError::Cancelled);
        }
        if let Some((failing, status)) = state.fail_assign
            && failing == scope
        {
            return Err(injected(status));
        }
        if !state.users.contains_key(&user.get()) {
            return Err(not_found("user"));
        }
        state.assignments.push((scope, entity_id, user));
        Ok(())
    }
}

#[async_trait]
impl ServiceDesk for InMemoryServiceDesk {
    async fn create_user(
        &self,
        user: &NewRemoteUser,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        check_cancel(cancel)?;
        let mut state = self.state();
        state.create_user_calls += 1;
        if let Some(status) = state.fail_create_user {
            return Err(injected(status));
        }
        if !state.allow_duplicate_emails
            && state.users.values().any(|u| u["email"] == user.email.as_str())
        {
            return Err(ServiceDeskError::Status {
                status: 409,
                body: format!("email {} already exists", user.email),
            });
        }

        state.next_user_id += 1;
        let id = state.next_user_id;
        let record = json!({
            "id": id,
            "name": user.name,
            "lastname": user.last_name,
            "email": user.email,
        });
        state.users.insert(id, record.clone());
        Ok(state.create_user_response.clone().unwrap_or(record))
    }

    async fn delete_user(&self, id: ExternalUserId, cancel: &CancellationToken) -> Result<()> {
        check_cancel(cancel)?;
        let mut state = self.state();
        state.delete_user_calls += 1;
        if let Some(status) = state.fail_delete_user {
            return Err(injected(status));
        }
        state
            .users
            .remove(&id.get())
            .map(|_| ())
            .ok_or_else(|| not_found("user"))
    }

    async fn get_user(&self, id: i64, cancel: &CancellationToken) -> Result<Value> {
        check_cancel(cancel)?;
        self.state()
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("user"))
    }

    async fn get_user_by_email(
        &self,
        email: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Value>> {
        check_cancel(cancel)?;
        let mut state = self.state();
        state.lookup_calls += 1;
        if let Some(status) = state.fail_lookup {
            return Err(injected(status));
        }
        Ok(state.users.values().find(|u| u["email"] == email).cloned())
    }

    async fn assign_user_to_company(
        &self,
        company_id: i64,
        user: ExternalUserId,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.assign(Scope::Company, company_id, user, cancel)
    }

    async fn assign_user_to_group(
        &self,
        group_id: i64,
        user: ExternalUserId,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.assign(Scope::Group, group_id, user, cancel)
    }

    async fn assign_user_to_location(
        &self,
        location_id: i64,
        user: ExternalUserId,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.assign(Scope::Location, location_id, user, cancel)
    }

    async fn create_ticket(
        &self,
        ticket: &NewRemoteTicket,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        check_cancel(cancel)?;
        let mut state = self.state();
        state.create_ticket_calls += 1;
        if let Some(status) = state.fail_create_ticket {
            return Err(injected(status));
        }

        state.next_ticket_id += 1;
        let id = state.next_ticket_id;
        let detail = json!({
            "id": id,
            "title": ticket.title,
            "description": ticket.description,
            "category_id": ticket.category_id,
            "priority_id": ticket.priority_id,
            "type_id": ticket.type_id,
            "creator_id": ticket.creator_id.get(),
            "status_id": 1,
            "attachments": ticket.attachments.iter().map(|a| a.filename.clone()).collect::<Vec<_>>(),
        });
        state.tickets.insert(id, detail);
        state.created_tickets.push(ticket.clone());
        Ok(state
            .create_ticket_response
            .clone()
            .unwrap_or_else(|| json!({ "status": "OK", "request_id": id })))
    }

    async fn update_ticket(
        &self,
        ticket_id: i64,
        changes: &TicketChanges,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        check_cancel(cancel)?;
        let mut state = self.state();
        let detail = state
            .tickets
            .get_mut(&ticket_id)
            .ok_or_else(|| not_found("ticket"))?;
        if let (Value::Object(detail), Ok(Value::Object(changes))) =
            (detail, serde_json::to_value(changes))
        {
            detail.extend(changes);
        }
        Ok(json!({ "status": "OK" }))
    }

    async fn ticket_detail(&self, ticket_id: &str, cancel: &CancellationToken) -> Result<Value> {
        check_cancel(cancel)?;
        let id: i64 = ticket_id.parse().map_err(|_| not_found("ticket"))?;
        self.state()
            .tickets
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("ticket"))
    }

    async fn ticket_comments(
        &self,
        request_id: i64,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        check_cancel(cancel)?;
        let comments = self
            .state()
            .comments
            .get(&request_id)
            .cloned()
            .unwrap_or_default();
        Ok(json!({ "data": comments }))
    }

    async fn add_ticket_comment(
        &self,
        comment: &NewComment,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        check_cancel(cancel)?;
        let mut state = self.state();
        if !state.tickets.contains_key(&comment.request_id) {
            return Err(not_found("ticket"));
        }
        let entry = json!({
            "author_id": comment.author_id.get(),
            "comment": comment.comment,
            "attachments": comment.attachments.len(),
        });
        state
            .comments
            .entry(comment.request_id)
            .or_default()
            .push(entry);
        Ok(json!({ "status": "OK" }))
    }

    async fn attachment(
        &self,
        attachment_id: &str,
        cancel: &CancellationToken,
    ) -> Result<DownloadedFile> {
        check_cancel(cancel)?;
        self.state()
            .attachments
            .get(attachment_id)
            .cloned()
            .ok_or_else(|| not_found("attachment"))
    }

    async fn attachment_info(
        &self,
        attachment_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let file = self.attachment(attachment_id, cancel).await?;
        Ok(json!({
            "id": attachment_id,
            "name": file.filename,
            "type": file.content_type,
            "size": file.bytes.len(),
        }))
    }

    async fn accept_solution(
        &self,
        request_id: i64,
        rating: u8,
        comment: &str,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        check_cancel(cancel)?;
        let mut state = self.state();
        let detail = state
            .tickets
            .get_mut(&request_id)
            .ok_or_else(|| not_found("ticket"))?;
        detail["status_id"] = json!(6);
        detail["rating"] = json!(rating);
        detail["solution_comment"] = json!(comment);
        Ok(json!({ "status": "OK" }))
    }

    async fn reject_solution(
        &self,
        request_id: i64,
        comment: &str,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        check_cancel(cancel)?;
        let mut state = self.state();
        let detail = state
            .tickets
            .get_mut(&request_id)
            .ok_or_else(|| not_found("ticket"))?;
        detail["status_id"] = json!(2);
        detail["rejection_comment"] = json!(comment);
        Ok(json!({ "status": "OK" }))
    }

    async fn categories(&self, cancel: &CancellationToken) -> Result<Value> {
        check_cancel(cancel)?;
        Ok(json!({ "data": self.state().categories.clone() }))
    }

    async fn articles_by_category(
        &self,
        category_id: i64,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        check_cancel(cancel)?;
        Ok(json!({ "data": [{ "id": 1, "category_id": category_id, "title": "Getting started" }] }))
    }
}
