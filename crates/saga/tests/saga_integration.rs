//! Integration tests for the identity and ticket sagas.

use std::sync::Arc;

use auth::{RevocationList, TokenIssuer};
use common::ErrorKind;
use saga::{
    CompensationPolicy, IdentitySaga, RegistrationInput, SagaError, ScopeConfig, TicketInput,
    TicketSaga,
};
use serde_json::json;
use service_desk::{InMemoryServiceDesk, Scope, UploadedFile};
use store::{
    CreateFailure, IdentityRepository, InMemoryIdentityRepository, InMemoryTicketRepository,
    TicketRepository,
};
use tokio_util::sync::CancellationToken;

type TestIdentitySaga = IdentitySaga<InMemoryIdentityRepository, InMemoryServiceDesk>;
type TestTicketSaga =
    TicketSaga<InMemoryIdentityRepository, InMemoryTicketRepository, InMemoryServiceDesk>;

struct TestHarness {
    identity_saga: TestIdentitySaga,
    ticket_saga: TestTicketSaga,
    identities: InMemoryIdentityRepository,
    tickets: InMemoryTicketRepository,
    desk: InMemoryServiceDesk,
    issuer: TokenIssuer,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_scopes(ScopeConfig {
            company_id: 135,
            group_id: 134,
            location_id: 136,
        })
    }

    fn with_scopes(scopes: ScopeConfig) -> Self {
        let identities = InMemoryIdentityRepository::new();
        let tickets = InMemoryTicketRepository::new();
        let desk = InMemoryServiceDesk::new();
        let issuer = TokenIssuer::new(b"saga-test-secret", RevocationList::new());

        let identity_saga =
            IdentitySaga::new(identities.clone(), desk.clone(), issuer.clone(), scopes);
        let ticket_saga = TicketSaga::new(identities.clone(), tickets.clone(), desk.clone());

        Self {
            identity_saga,
            ticket_saga,
            identities,
            tickets,
            desk,
            issuer,
        }
    }

    async fn register(&self, email: &str) -> Result<auth::AuthResponse, SagaError> {
        self.identity_saga
            .register(&registration(email), &CancellationToken::new())
            .await
    }
}

fn registration(email: &str) -> RegistrationInput {
    RegistrationInput {
        name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        email: email.to_string(),
        password: "secret1".to_string(),
    }
}

fn ticket_input() -> TicketInput {
    TicketInput {
        source_id: 2,
        category_id: 115,
        type_id: 1,
        priority_id: 2,
        title: "VPN down".to_string(),
        description: "Cannot connect since this morning".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_registration_success() {
    let h = TestHarness::new();

    let response = h.register("a@x.com").await.unwrap();
    assert_eq!(response.email, "a@x.com");
    assert_eq!(h.issuer.validate(&response.token).unwrap().sub, "a@x.com");
    assert_eq!(h.issuer.validate(&response.refresh_token).unwrap().sub, "a@x.com");

    let identity = h.identities.get_by_email("a@x.com").await.unwrap().unwrap();
    let external_id = identity.external_user_id.unwrap();
    assert!(h.desk.has_user(external_id));
    assert_ne!(identity.password_hash, "secret1");
    assert_eq!(identity.created_by, "a@x.com");
    assert_eq!(h.identities.len().await, 1);

    assert_eq!(
        h.desk.assignments(),
        vec![
            (Scope::Company, 135, external_id),
            (Scope::Group, 134, external_id),
            (Scope::Location, 136, external_id),
        ]
    );
    assert_eq!(h.desk.delete_user_calls(), 0);
}

#[tokio::test]
async fn test_unconfigured_scopes_are_skipped() {
    let h = TestHarness::with_scopes(ScopeConfig::default());
    h.register("a@x.com").await.unwrap();
    assert_eq!(h.desk.assign_calls(), 0);
}

#[tokio::test]
async fn test_invalid_input_touches_nothing() {
    let h = TestHarness::new();
    let err = h.register("not-an-email").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(h.desk.lookup_calls(), 0);
    assert_eq!(h.desk.create_user_calls(), 0);
}

#[tokio::test]
async fn test_local_hit_makes_no_remote_calls() {
    let h = TestHarness::new();
    h.register("a@x.com").await.unwrap();
    let lookups = h.desk.lookup_calls();

    let err = h.register("a@x.com").await.unwrap_err();
    assert!(matches!(err, SagaError::AlreadyExists(ref msg) if msg == "email already registered"));
    assert_eq!(h.desk.lookup_calls(), lookups);
    assert_eq!(h.desk.create_user_calls(), 1);
}

#[tokio::test]
async fn test_remote_hit_creates_and_deletes_nothing() {
    let h = TestHarness::new();
    h.desk.insert_user("a@x.com");

    let err = h.register("a@x.com").await.unwrap_err();
    assert!(matches!(err, SagaError::AlreadyExists(ref msg) if msg == "email already in use"));
    assert_eq!(h.desk.create_user_calls(), 0);
    assert_eq!(h.desk.delete_user_calls(), 0);
    assert_eq!(h.identities.create_calls().await, 0);
}

#[tokio::test]
async fn test_rejected_lookup_counts_as_absent() {
    let h = TestHarness::new();
    h.desk.set_fail_lookup(Some(404));

    h.register("a@x.com").await.unwrap();
    assert_eq!(h.desk.create_user_calls(), 1);
}

#[tokio::test]
async fn test_failing_lookup_is_external_error() {
    let h = TestHarness::new();
    h.desk.set_fail_lookup(Some(503));

    let err = h.register("a@x.com").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExternalServiceError);
    assert_eq!(h.desk.create_user_calls(), 0);
}

#[tokio::test]
async fn test_missing_external_id_needs_no_compensation() {
    let h = TestHarness::new();
    h.desk.set_create_user_response(Some(json!({"status": "OK"})));

    let err = h.register("a@x.com").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExternalServiceError);
    assert_eq!(h.desk.delete_user_calls(), 0);
    assert!(h.identities.is_empty().await);
}

#[tokio::test]
async fn test_duplicate_key_compensates_once() {
    let h = TestHarness::new();
    h.identities
        .set_create_failure(Some(CreateFailure::Duplicate))
        .await;

    let err = h.register("a@x.com").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    assert_eq!(h.desk.create_user_calls(), 1);
    assert_eq!(h.desk.delete_user_calls(), 1);
    assert_eq!(h.desk.user_count(), 0);
}

#[tokio::test]
async fn test_local_failure_compensates_once() {
    let h = TestHarness::new();
    h.identities
        .set_create_failure(Some(CreateFailure::Unavailable))
        .await;

    let err = h.register("a@x.com").await.unwrap_err();
    assert!(matches!(err, SagaError::Internal(_)));
    assert_eq!(h.desk.delete_user_calls(), 1);
    assert_eq!(h.desk.user_count(), 0);
}

#[tokio::test]
async fn test_failed_compensation_reports_both_causes() {
    let h = TestHarness::new();
    h.identities
        .set_create_failure(Some(CreateFailure::Unavailable))
        .await;
    h.desk.set_fail_delete_user(Some(500));

    let err = h.register("a@x.com").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(h.desk.delete_user_calls(), 1);

    let text = err.to_string();
    assert!(text.contains("connection refused"), "{text}");
    assert!(text.contains("injected failure"), "{text}");
    assert!(text.contains("manual cleanup"), "{text}");
}

#[tokio::test]
async fn test_scope_failure_deletes_remote_identity() {
    let h = TestHarness::new();
    h.desk.set_fail_assign(Some((Scope::Group, 500)));

    let err = h.register("a@x.com").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExternalServiceError);
    assert_eq!(h.desk.delete_user_calls(), 1);
    assert_eq!(h.desk.user_count(), 0);
    assert!(h.identities.is_empty().await);
}

#[tokio::test]
async fn test_scope_failure_with_failed_compensation_adds_note() {
    let h = TestHarness::new();
    h.desk.set_fail_assign(Some((Scope::Company, 500)));
    h.desk.set_fail_delete_user(Some(502));

    let err = h.register("a@x.com").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExternalServiceError);
    assert!(err.to_string().contains("manual cleanup required"));
    assert_eq!(h.desk.user_count(), 1);
}

#[tokio::test]
async fn test_cancelled_scope_assignment_deletes_remote_identity() {
    let h = TestHarness::new();
    h.desk.set_cancel_on_assign(Some(Scope::Group));
    let cancel = CancellationToken::new();

    let err = h
        .identity_saga
        .register(&registration("a@x.com"), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, SagaError::Cancelled { .. }), "{err}");
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert!(cancel.is_cancelled());
    // The remote identity already existed, so it is removed despite the cancellation.
    assert_eq!(h.desk.create_user_calls(), 1);
    assert_eq!(h.desk.delete_user_calls(), 1);
    assert_eq!(h.desk.user_count(), 0);
    assert!(h.identities.is_empty().await);
}

#[tokio::test]
async fn test_cancelled_registration_creates_nothing() {
    let h = TestHarness::new();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = h
        .identity_saga
        .register(&registration("a@x.com"), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, SagaError::Cancelled { step: "check_remote_uniqueness" }));
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(h.desk.create_user_calls(), 0);
    assert_eq!(h.desk.delete_user_calls(), 0);
}

async fn race_two_registrations(h: Arc<TestHarness>) {
    let first = {
        let h = Arc::clone(&h);
        tokio::spawn(async move { h.register("a@x.com").await })
    };
    let second = {
        let h = Arc::clone(&h);
        tokio::spawn(async move { h.register("a@x.com").await })
    };
    let results = [first.await.unwrap(), second.await.unwrap()];

    let successes = results.iter().filter(|r| r.is_ok()).count();
    let duplicates = results
        .iter()
        .filter(|r| matches!(r, Err(e) if e.kind() == ErrorKind::AlreadyExists))
        .count();
    assert_eq!(successes, 1);
    assert_eq!(duplicates, 1);

    // Every remote identity except the winner's was deleted again.
    assert_eq!(h.identities.len().await, 1);
    assert_eq!(h.desk.user_count(), 1);
    let identity = h.identities.get_by_email("a@x.com").await.unwrap().unwrap();
    assert!(h.desk.has_user(identity.external_user_id.unwrap()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_registration_against_unique_service_desk() {
    let h = Arc::new(TestHarness::new());
    race_two_registrations(Arc::clone(&h)).await;
    assert_eq!(h.desk.delete_user_calls(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_registration_resolved_by_local_constraint() {
    let h = Arc::new(TestHarness::new());
    h.desk.set_allow_duplicate_emails(true);
    race_two_registrations(Arc::clone(&h)).await;
    assert_eq!(h.desk.delete_user_calls(), h.desk.create_user_calls() - 1);
}

#[tokio::test]
async fn test_ticket_creation_success() {
    let h = TestHarness::new();
    h.register("a@x.com").await.unwrap();
    let identity = h.identities.get_by_email("a@x.com").await.unwrap().unwrap();

    let created = h
        .ticket_saga
        .create("a@x.com", ticket_input(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(created.external_ticket_id, "1");
    assert_eq!(created.remote["request_id"], 1);

    let stored = h.tickets.get_by_external_id("1").await.unwrap().unwrap();
    assert_eq!(stored.id, created.ticket_id);
    assert_eq!(stored.creator_email, "a@x.com");
    assert_eq!(Some(stored.customer_external_id), identity.external_user_id);

    let sent = &h.desk.created_tickets()[0];
    assert_eq!(sent.creator_id, sent.customer_id);
    assert!(sent.date_occurred > 0);
}

#[tokio::test]
async fn test_ticket_without_remote_id_is_stored_with_empty_id() {
    let h = TestHarness::new();
    h.register("a@x.com").await.unwrap();
    h.desk.set_create_ticket_response(Some(json!({ "status": "OK" })));

    let created = h
        .ticket_saga
        .create("a@x.com", ticket_input(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(created.external_ticket_id, "");
    assert_eq!(created.remote, json!({ "status": "OK" }));
    assert_eq!(h.tickets.len().await, 1);
    let stored = h.tickets.get_by_external_id("").await.unwrap().unwrap();
    assert_eq!(stored.id, created.ticket_id);
}

#[tokio::test]
async fn test_ticket_with_attachments() {
    let h = TestHarness::new();
    h.register("a@x.com").await.unwrap();

    let mut input = ticket_input();
    input.attachments.push(UploadedFile {
        filename: "screen.png".to_string(),
        content_type: Some("image/png".to_string()),
        bytes: vec![1, 2, 3],
    });
    h.ticket_saga
        .create("a@x.com", input, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(h.desk.created_tickets()[0].attachments.len(), 1);
}

#[tokio::test]
async fn test_ticket_for_unknown_creator_is_not_found() {
    let h = TestHarness::new();
    let err = h
        .ticket_saga
        .create("ghost@x.com", ticket_input(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(h.desk.create_ticket_calls(), 0);
}

#[tokio::test]
async fn test_remote_ticket_failure_is_external_error() {
    let h = TestHarness::new();
    h.register("a@x.com").await.unwrap();
    h.desk.set_fail_create_ticket(Some(400));

    let err = h
        .ticket_saga
        .create("a@x.com", ticket_input(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExternalServiceError);
    assert!(err.to_string().contains("injected failure"));
    assert!(h.tickets.is_empty().await);
}

#[tokio::test]
async fn test_local_ticket_failure_is_not_compensated() {
    let h = TestHarness::new();
    h.register("a@x.com").await.unwrap();
    h.tickets.set_fail_on_create(true).await;

    let err = h
        .ticket_saga
        .create("a@x.com", ticket_input(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Internal);
    let text = err.to_string();
    assert!(text.contains("(ID: 1)"), "{text}");
    assert!(text.contains("data inconsistency detected"), "{text}");
    // The remote ticket survives.
    assert_eq!(h.desk.create_ticket_calls(), 1);
    assert_eq!(TestTicketSaga::POLICY, CompensationPolicy::AcceptAndReconcile);
    assert_eq!(TestIdentitySaga::POLICY, CompensationPolicy::Compensate);
}

#[tokio::test]
async fn test_ticket_listing_after_creation() {
    let h = TestHarness::new();
    h.register("a@x.com").await.unwrap();
    for _ in 0..3 {
        h.ticket_saga
            .create("a@x.com", ticket_input(), &CancellationToken::new())
            .await
            .unwrap();
    }

    let listed = h
        .tickets
        .list_by_creator(Some("a@x.com"), 2, 0)
        .await
        .unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].external_ticket_id, "3");
    assert_eq!(h.tickets.count_by_creator(Some("a@x.com")).await.unwrap(), 3);
}
