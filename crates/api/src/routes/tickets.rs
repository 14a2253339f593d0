//! Ticket endpoints. Every handler requires a bearer token.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{FromRequest, Multipart, Path, Query, Request, State};
use axum::http::header::{ACCEPT, CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use saga::TicketInput;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use service_desk::{TicketChanges, UploadedFile};
use ticketing::TicketPage;

use crate::error::ApiError;
use crate::extract::AuthUser;
use crate::state::AppState;

/// Page size when the caller does not ask for one.
const DEFAULT_LIST_LIMIT: i64 = 10;

/// Ticket creation body, as JSON or as the `request` part of a multipart form.
#[derive(Debug, Default, Deserialize)]
pub struct CreateTicketRequest {
    #[serde(default)]
    pub source_id: i64,
    #[serde(default)]
    pub category_id: i64,
    #[serde(default)]
    pub type_id: i64,
    #[serde(default)]
    pub priority_id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "date_ocurred")]
    pub date_occurred: i64,
}

impl CreateTicketRequest {
    fn into_input(self, attachments: Vec<UploadedFile>) -> TicketInput {
        TicketInput {
            source_id: self.source_id,
            category_id: self.category_id,
            type_id: self.type_id,
            priority_id: self.priority_id,
            title: self.title,
            description: self.description,
            date_occurred: self.date_occurred,
            attachments,
        }
    }
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Deserialize)]
pub struct CommentRequest {
    #[serde(default)]
    pub comment: String,
}

#[derive(Deserialize)]
pub struct SolutionRequest {
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub rating: i64,
}

#[derive(Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
}

/// POST /api/v1/tickets — JSON, or multipart with `attachments` file parts.
pub async fn create(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    request: Request,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let input = if is_multipart(request.headers()) {
        let form = read_form(request, &state).await?;
        form.ticket_input()?
    } else {
        let Json(body) = Json::<CreateTicketRequest>::from_request(request, &state).await?;
        body.into_input(Vec::new())
    };

    let created = state
        .ticket_saga
        .create(&user.email, input, &state.request_token())
        .await?;
    Ok((StatusCode::CREATED, Json(created.remote)))
}

/// GET /api/v1/tickets?page=&limit= — the caller's tickets, newest first.
pub async fn list(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<TicketPage>, ApiError> {
    let Query(query) = query?;
    let page = positive_or(query.page.as_deref(), 1);
    let limit = positive_or(query.limit.as_deref(), DEFAULT_LIST_LIMIT);

    let page = state
        .tickets
        .list(&user.email, page, limit, &state.request_token())
        .await?;
    Ok(Json(page))
}

/// GET /api/v1/tickets/{id}
pub async fn detail(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let detail = state.tickets.detail(&id, &state.request_token()).await?;
    Ok(Json(detail))
}

/// PUT /api/v1/tickets/{id} — partial update.
pub async fn update(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<TicketChanges>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let ticket_id = ticket_id(&id)?;
    let Json(changes) = payload?;
    let updated = state
        .tickets
        .update(ticket_id, &changes, &state.request_token())
        .await?;
    Ok(Json(updated))
}

/// GET /api/v1/tickets/{id}/comments
pub async fn comments(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let request_id = ticket_id(&id)?;
    let comments = state
        .tickets
        .comments(request_id, &state.request_token())
        .await?;
    Ok(Json(comments))
}

/// POST /api/v1/tickets/{id}/comments — JSON `{"comment"}` or multipart with
/// attachments. The comment is authored by the caller.
pub async fn add_comment(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    request: Request,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let request_id = ticket_id(&id)?;
    let (comment, attachments) = if is_multipart(request.headers()) {
        let mut form = read_form(request, &state).await?;
        (form.fields.remove("comment").unwrap_or_default(), form.files)
    } else {
        let Json(body) = Json::<CommentRequest>::from_request(request, &state).await?;
        (body.comment, Vec::new())
    };

    let response = state
        .tickets
        .add_comment(
            &user.email,
            request_id,
            comment,
            attachments,
            &state.request_token(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /api/v1/tickets/attachments/{attachment_id}
///
/// Streams the file, or returns its metadata when the client accepts JSON.
pub async fn attachment(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(attachment_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let cancel = state.request_token();
    let wants_json = headers
        .get(ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("application/json"));

    if wants_json {
        let info = state.tickets.attachment_info(&attachment_id, &cancel).await?;
        return Ok(Json(Envelope {
            success: true,
            data: info,
        })
        .into_response());
    }

    let file = state.tickets.attachment(&attachment_id, &cancel).await?;
    let mut response_headers = HeaderMap::new();
    let content_type = file
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
        .unwrap_or(HeaderValue::from_static("application/octet-stream"));
    response_headers.insert(CONTENT_TYPE, content_type);
    if let Some(disposition) = file
        .filename
        .as_deref()
        .filter(|name| !name.is_empty())
        .and_then(|name| HeaderValue::from_str(&format!("attachment; filename=\"{name}\"")).ok())
    {
        response_headers.insert(CONTENT_DISPOSITION, disposition);
    }
    Ok((response_headers, file.bytes).into_response())
}

/// PUT /api/v1/tickets/{id}/solution — accepts the solution with a rating.
pub async fn accept_solution(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<SolutionRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let request_id = ticket_id(&id)?;
    let Json(body) = payload?;
    let response = state
        .tickets
        .accept_solution(request_id, body.rating, &body.comment, &state.request_token())
        .await?;
    Ok(Json(response))
}

/// PUT /api/v1/tickets/{id}/solution/reject
pub async fn reject_solution(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<CommentRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let request_id = ticket_id(&id)?;
    let Json(body) = payload?;
    let response = state
        .tickets
        .reject_solution(request_id, &body.comment, &state.request_token())
        .await?;
    Ok(Json(response))
}

fn ticket_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::bad_request("ticket id must be numeric"))
}

/// Parses a positive integer, falling back to `default` for anything else.
fn positive_or(raw: Option<&str>, default: i64) -> i64 {
    raw.and_then(|v| v.trim().parse().ok())
        .filter(|v: &i64| *v > 0)
        .unwrap_or(default)
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("multipart/form-data"))
}

/// A multipart body split into text fields and attachment files.
#[derive(Debug, Default)]
struct Form {
    fields: HashMap<String, String>,
    files: Vec<UploadedFile>,
}

impl Form {
    /// Builds ticket input from either a `request` JSON part or flat fields.
    fn ticket_input(mut self) -> Result<TicketInput, ApiError> {
        if let Some(raw) = self.fields.remove("request") {
            let body: CreateTicketRequest = serde_json::from_str(&raw)
                .map_err(|e| ApiError::bad_request(format!("invalid request JSON: {e}")))?;
            return Ok(body.into_input(self.files));
        }

        let body = CreateTicketRequest {
            source_id: self.required_int("source_id")?,
            category_id: self.required_int("category_id")?,
            type_id: self.required_int("type_id")?,
            priority_id: self.required_int("priority_id")?,
            title: self.fields.remove("title").unwrap_or_default(),
            description: self.fields.remove("description").unwrap_or_default(),
            date_occurred: self
                .fields
                .get("date_ocurred")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(0),
        };
        Ok(body.into_input(self.files))
    }

    fn required_int(&self, key: &str) -> Result<i64, ApiError> {
        let value = self
            .fields
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ApiError::bad_request(format!("{key} is required")))?;
        value
            .parse()
            .map_err(|_| ApiError::bad_request(format!("invalid {key}")))
    }
}

async fn read_form(request: Request, state: &Arc<AppState>) -> Result<Form, ApiError> {
    let mut multipart = Multipart::from_request(request, state)
        .await
        .map_err(invalid_form)?;

    let mut form = Form::default();
    while let Some(field) = multipart.next_field().await.map_err(invalid_form)? {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(str::to_string) {
            Some(filename) if name == "attachments" || name == "attachments[]" => {
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(invalid_form)?;
                form.files.push(UploadedFile {
                    filename,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            Some(filename) => {
                tracing::debug!(field = %name, %filename, "ignoring unexpected file part");
            }
            None => {
                let value = field.text().await.map_err(invalid_form)?;
                form.fields.entry(name).or_insert(value);
            }
        }
    }
    Ok(form)
}

fn invalid_form(error: impl std::fmt::Display) -> ApiError {
    ApiError::bad_request(format!("invalid multipart form: {error}"))
}
