//! Identity records and the repository contract the identity saga relies on.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{ExternalUserId, IdentityId};
use serde::{Deserialize, Serialize};

use crate::Result;

/// A persisted identity.
///
/// `password_hash` is always a salted hash; the plaintext never reaches the
/// local store. `external_user_id` is `None` only for rows that predate the
/// linkage to the external service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: IdentityId,
    pub name: String,
    pub last_name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub external_user_id: Option<ExternalUserId>,
    pub created_by: String,
    pub updated_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for [`IdentityRepository::create`].
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub external_user_id: ExternalUserId,
    /// Email of whoever initiated the write; used for both audit columns.
    pub created_by: String,
}

impl NewIdentity {
    /// Materializes the record with a fresh id and timestamps.
    pub fn into_identity(self) -> Identity {
        let now = Utc::now();
        Identity {
            id: IdentityId::new(),
            name: self.name,
            last_name: self.last_name,
            email: self.email,
            password_hash: self.password_hash,
            external_user_id: Some(self.external_user_id),
            updated_by: self.created_by.clone(),
            created_by: self.created_by,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Persistence for identities.
///
/// Implementations must enforce email uniqueness atomically and report it as
/// [`StoreError::DuplicateKey`](crate::StoreError::DuplicateKey).
#[async_trait]
pub trait IdentityRepository: Send + Sync {
    /// Inserts a new identity.
    async fn create(&self, identity: NewIdentity) -> Result<Identity>;

    /// Looks an identity up by email.
    async fn get_by_email(&self, email: &str) -> Result<Option<Identity>>;

    /// Deletes an identity. Deleting a missing id is not an error.
    async fn delete(&self, id: IdentityId) -> Result<()>;
}

#[async_trait]
impl<T: IdentityRepository + ?Sized> IdentityRepository for Arc<T> {
    async fn create(&self, identity: NewIdentity) -> Result<Identity> {
        (**self).create(identity).await
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<Identity>> {
        (**self).get_by_email(email).await
    }

    async fn delete(&self, id: IdentityId) -> Result<()> {
        (**self).delete(id).await
    }
}
