//! Client for the external service desk.
//!
//! [`ResilientClient`] owns the transport concerns: basic authentication,
//! per-attempt timeouts, retry with exponential backoff, cancellation and
//! response decoding. [`ServiceDesk`] is the collaborator the sagas see;
//! [`HttpServiceDesk`] implements it over the client and
//! [`InMemoryServiceDesk`] is a fake for tests.

pub mod body;
pub mod client;
pub mod desk;
pub mod error;
pub mod http;
pub mod memory;
pub mod retry;

pub use body::{DownloadedFile, FilePart, MultipartBody, RequestBody};
pub use client::{ClientConfig, IDEMPOTENCY_KEY_HEADER, ResilientClient};
pub use desk::{
    NewComment, NewRemoteTicket, NewRemoteUser, ServiceDesk, TicketChanges, UploadedFile,
    extract_ticket_id, extract_user_id,
};
pub use error::{Result, ServiceDeskError};
pub use http::HttpServiceDesk;
pub use memory::{InMemoryServiceDesk, Scope};
pub use retry::RetryPolicy;
