use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::IdentityId;
use tokio::sync::RwLock;

use crate::{
    Identity, IdentityRepository, NewIdentity, NewTicket, Result, StoreError, Ticket,
    TicketRepository,
};

/// Failure to inject into the next [`InMemoryIdentityRepository::create`] calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateFailure {
    /// Report a unique-constraint violation without inserting.
    Duplicate,
    /// Report the store as unavailable.
    Unavailable,
}

#[derive(Debug, Default)]
struct IdentityState {
    identities: HashMap<IdentityId, Identity>,
    create_failure: Option<CreateFailure>,
    fail_on_delete: bool,
    create_calls: usize,
    delete_calls: usize,
}

/// In-memory identity repository for tests and local runs.
///
/// Email uniqueness is checked under the write lock, which gives the same
/// atomicity a database unique constraint does.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIdentityRepository {
    state: Arc<RwLock<IdentityState>>,
}

impl InMemoryIdentityRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `create` fail the given way (`None` clears it).
    pub async fn set_create_failure(&self, failure: Option<CreateFailure>) {
        self.state.write().await.create_failure = failure;
    }

    /// Makes every subsequent `delete` fail.
    pub async fn set_fail_on_delete(&self, fail: bool) {
        self.state.write().await.fail_on_delete = fail;
    }

    /// Number of stored identities.
    pub async fn len(&self) -> usize {
        self.state.read().await.identities.len()
    }

    /// Returns true if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of `create` calls, successful or not.
    pub async fn create_calls(&self) -> usize {
        self.state.read().await.create_calls
    }

    /// Number of `delete` calls, successful or not.
    pub async fn delete_calls(&self) -> usize {
        self.state.read().await.delete_calls
    }
}

#[async_trait]
impl IdentityRepository for InMemoryIdentityRepository {
    async fn create(&self, identity: NewIdentity) -> Result<Identity> {
        let mut state = self.state.write().await;
        state.create_calls += 1;

        match state.create_failure {
            Some(CreateFailure::Duplicate) => {
                return Err(StoreError::DuplicateKey {
                    field: "email",
                    value: identity.email,
                });
            }
            Some(CreateFailure::Unavailable) => {
                return Err(StoreError::Unavailable("connection refused".to_string()));
            }
            None => {}
        }

        if state.identities.values().any(|i| i.email == identity.email) {
            return Err(StoreError::DuplicateKey {
                field: "email",
                value: identity.email,
            });
        }

        let record = identity.into_identity();
        state.identities.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<Identity>> {
        let state = self.state.read().await;
        Ok(state.identities.values().find(|i| i.email == email).cloned())
    }

    async fn delete(&self, id: IdentityId) -> Result<()> {
        let mut state = self.state.write().await;
        state.delete_calls += 1;
        if state.fail_on_delete {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        state.identities.remove(&id);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct TicketState {
    tickets: Vec<Ticket>,
    fail_on_create: bool,
}

/// In-memory ticket repository for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTicketRepository {
    state: Arc<RwLock<TicketState>>,
}

impl InMemoryTicketRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `create` fail.
    pub async fn set_fail_on_create(&self, fail: bool) {
        self.state.write().await.fail_on_create = fail;
    }

    /// Number of stored tickets.
    pub async fn len(&self) -> usize {
        self.state.read().await.tickets.len()
    }

    /// Returns true if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn matches_creator(ticket: &Ticket, creator_email: Option<&str>) -> bool {
    creator_email.is_none_or(|email| ticket.creator_email == email)
}

#[async_trait]
impl TicketRepository for InMemoryTicketRepository {
    async fn create(&self, ticket: NewTicket) -> Result<Ticket> {
        let mut state = self.state.write().await;
        if state.fail_on_create {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        let record = ticket.into_ticket();
        state.tickets.push(record.clone());
        Ok(record)
    }

    async fn get_by_external_id(&self, external_ticket_id: &str) -> Result<Option<Ticket>> {
        let state = self.state.read().await;
        Ok(state
            .tickets
            .iter()
            .find(|t| t.external_ticket_id == external_ticket_id)
            .cloned())
    }

    async fn list_by_creator(
        &self,
        creator_email: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Ticket>> {
        let state = self.state.read().await;
        // Insertion order is creation order; newest first.
        Ok(state
            .tickets
            .iter()
            .rev()
            .filter(|t| matches_creator(t, creator_email))
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn count_by_creator(&self, creator_email: Option<&str>) -> Result<i64> {
        let state = self.state.read().await;
        Ok(state
            .tickets
            .iter()
            .filter(|t| matches_creator(t, creator_email))
            .count() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ExternalUserId;

    fn new_identity(email: &str) -> NewIdentity {
        NewIdentity {
            name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: email.to_string(),
            password_hash: "$argon2id$stub".to_string(),
            external_user_id: ExternalUserId::new(10).unwrap(),
            created_by: email.to_string(),
        }
    }

    fn new_ticket(email: &str, external_id: &str) -> NewTicket {
        NewTicket {
            external_ticket_id: external_id.to_string(),
            creator_email: email.to_string(),
            creator_external_id: ExternalUserId::new(10).unwrap(),
            customer_external_id: ExternalUserId::new(10).unwrap(),
            source_id: 1,
            category_id: 2,
            type_id: 1,
            priority_id: 3,
            title: "Printer on fire".to_string(),
            description: "Again".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get_identity() {
        let repo = InMemoryIdentityRepository::new();
        let created = repo.create(new_identity("a@x.com")).await.unwrap();

        let found = repo.get_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(found, created);
        assert_eq!(found.created_by, "a@x.com");
        assert_eq!(found.updated_by, "a@x.com");
        assert!(repo.get_by_email("b@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let repo = InMemoryIdentityRepository::new();
        repo.create(new_identity("a@x.com")).await.unwrap();

        let err = repo.create(new_identity("a@x.com")).await.unwrap_err();
        assert!(err.is_duplicate_key());
        assert_eq!(repo.len().await, 1);
        assert_eq!(repo.create_calls().await, 2);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let repo = InMemoryIdentityRepository::new();
        repo.set_create_failure(Some(CreateFailure::Unavailable)).await;
        let err = repo.create(new_identity("a@x.com")).await.unwrap_err();
        assert!(!err.is_duplicate_key());
        assert!(repo.is_empty().await);

        repo.set_create_failure(None).await;
        let created = repo.create(new_identity("a@x.com")).await.unwrap();

        repo.set_fail_on_delete(true).await;
        assert!(repo.delete(created.id).await.is_err());
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn test_delete_identity() {
        let repo = InMemoryIdentityRepository::new();
        let created = repo.create(new_identity("a@x.com")).await.unwrap();
        repo.delete(created.id).await.unwrap();
        assert!(repo.is_empty().await);
        // Deleting again is a no-op.
        repo.delete(created.id).await.unwrap();
        assert_eq!(repo.delete_calls().await, 2);
    }

    #[tokio::test]
    async fn test_ticket_listing_is_newest_first_and_paginated() {
        let repo = InMemoryTicketRepository::new();
        for i in 1..=5 {
            repo.create(new_ticket("a@x.com", &i.to_string()))
                .await
                .unwrap();
        }
        repo.create(new_ticket("b@x.com", "99")).await.unwrap();

        let page = repo.list_by_creator(Some("a@x.com"), 2, 0).await.unwrap();
        let ids: Vec<_> = page.iter().map(|t| t.external_ticket_id.as_str()).collect();
        assert_eq!(ids, ["5", "4"]);

        let page = repo.list_by_creator(Some("a@x.com"), 2, 4).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].external_ticket_id, "1");

        assert_eq!(repo.count_by_creator(Some("a@x.com")).await.unwrap(), 5);
        assert_eq!(repo.count_by_creator(None).await.unwrap(), 6);
        assert!(repo.get_by_external_id("99").await.unwrap().is_some());
    }
}
