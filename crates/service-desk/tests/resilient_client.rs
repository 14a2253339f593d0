//! Resilient client behaviour against a mock service desk.

use std::time::{Duration, Instant};

use reqwest::Method;
use serde_json::json;
use service_desk::{
    ClientConfig, FilePart, IDEMPOTENCY_KEY_HEADER, MultipartBody, RequestBody, ResilientClient,
    RetryPolicy, ServiceDeskError,
};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_with(server: &MockServer, retry: RetryPolicy) -> ResilientClient {
    let mut config = ClientConfig::new(server.uri(), "svc", "s3cret");
    config.timeout = Duration::from_secs(5);
    config.retry = retry;
    ResilientClient::new(config).unwrap()
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        ..RetryPolicy::default()
    }
}

#[tokio::test]
async fn test_503_is_retried_three_times_with_backoff() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/incident"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let client = client_with(&server, RetryPolicy::default());
    let started = Instant::now();
    let err = client
        .execute(
            Method::GET,
            "incident",
            &[("id", "1".to_string())],
            RequestBody::Empty,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    // 500ms + 1000ms between the three attempts.
    assert!(started.elapsed() >= Duration::from_millis(1500));
    match err {
        ServiceDeskError::RetryExhausted { attempts, last } => {
            assert_eq!(attempts, 3);
            assert!(matches!(*last, ServiceDeskError::Status { status: 503, .. }));
        }
        other => panic!("expected RetryExhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn test_404_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such user"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_with(&server, fast_retry());
    let err = client
        .execute(
            Method::GET,
            "user",
            &[("id", "9".to_string())],
            RequestBody::Empty,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    match err {
        ServiceDeskError::Status { status, body } => {
            assert_eq!(status, 404);
            assert_eq!(body, "no such user");
        }
        other => panic!("expected Status, got {other:?}"),
    }
}

#[tokio::test]
async fn test_429_is_retried_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/categories"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/categories"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1})))
        .mount(&server)
        .await;

    let client = client_with(&server, fast_retry());
    let value = client
        .execute(
            Method::GET,
            "categories",
            &[],
            RequestBody::Empty,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(value, json!({"id": 1}));
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_array_response_is_wrapped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/categories"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 115}, {"id": 116}])))
        .mount(&server)
        .await;

    let client = client_with(&server, fast_retry());
    let value = client
        .execute(
            Method::GET,
            "categories",
            &[],
            RequestBody::Empty,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(value, json!({"data": [{"id": 115}, {"id": 116}]}));
}

#[tokio::test]
async fn test_undecodable_success_is_terminal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/incident"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_with(&server, fast_retry());
    let err = client
        .execute(
            Method::GET,
            "incident",
            &[],
            RequestBody::Empty,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceDeskError::Decode(_)));
}

#[tokio::test]
async fn test_cancellation_during_backoff_stops_retrying() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = client_with(&server, RetryPolicy::default());
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = client
        .execute(
            Method::POST,
            "user",
            &[],
            RequestBody::Json(json!({"email": "a@x.com"})),
            &cancel,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceDeskError::Cancelled));
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_already_cancelled_token_sends_nothing() {
    let server = MockServer::start().await;
    let client = client_with(&server, fast_retry());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = client
        .execute(Method::GET, "user", &[], RequestBody::Empty, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceDeskError::Cancelled));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_retries_reuse_idempotency_key_and_auth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/incident"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let client = client_with(&server, fast_retry());
    let _ = client
        .execute(
            Method::POST,
            "incident",
            &[],
            RequestBody::Json(json!({"title": "x"})),
            &CancellationToken::new(),
        )
        .await;

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
    let keys: Vec<_> = requests
        .iter()
        .map(|r| r.headers.get(IDEMPOTENCY_KEY_HEADER).unwrap().clone())
        .collect();
    assert!(keys.iter().all(|k| *k == keys[0]));
    let auth = requests[0].headers.get("authorization").unwrap();
    assert!(auth.to_str().unwrap().starts_with("Basic "));

    // A new logical call gets a new key.
    let _ = client
        .execute(
            Method::POST,
            "incident",
            &[],
            RequestBody::Json(json!({"title": "y"})),
            &CancellationToken::new(),
        )
        .await;
    let requests = server.received_requests().await.unwrap();
    assert_ne!(requests[3].headers.get(IDEMPOTENCY_KEY_HEADER).unwrap(), &keys[0]);
}

#[tokio::test]
async fn test_multipart_body_is_rebuilt_for_each_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/incident"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/incident"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"request_id": 31})))
        .mount(&server)
        .await;

    let body = MultipartBody::new().text("title", "Screen").file(FilePart {
        field: "attachments[]".to_string(),
        filename: "screen.png".to_string(),
        content_type: Some("image/png".to_string()),
        bytes: b"PNGDATA".to_vec(),
    });

    let client = client_with(&server, fast_retry());
    let value = client
        .execute(
            Method::POST,
            "incident",
            &[],
            RequestBody::Multipart(body),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(value["request_id"], 31);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    for request in &requests {
        let content_type = request.headers.get("content-type").unwrap().to_str().unwrap();
        assert!(content_type.starts_with("multipart/form-data"));
        let body = String::from_utf8_lossy(&request.body);
        assert!(body.contains("screen.png"));
        assert!(body.contains("PNGDATA"));
    }
}

#[tokio::test]
async fn test_execute_bytes_reads_file_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/incident.attachment"))
        .and(query_param("id", "77"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/pdf")
                .insert_header("content-disposition", r#"attachment; filename="invoice.pdf""#)
                .set_body_bytes(b"%PDF-1.4".to_vec()),
        )
        .mount(&server)
        .await;

    let client = client_with(&server, fast_retry());
    let file = client
        .execute_bytes(
            "incident.attachment",
            &[("id", "77".to_string())],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(file.bytes, b"%PDF-1.4");
    assert_eq!(file.filename.as_deref(), Some("invoice.pdf"));
    assert_eq!(file.content_type.as_deref(), Some("application/pdf"));
}

#[tokio::test]
async fn test_transport_error_is_retried() {
    // Nothing listens on port 1.
    let mut config = ClientConfig::new("http://127.0.0.1:1", "svc", "s3cret");
    config.retry = fast_retry();
    let client = ResilientClient::new(config).unwrap();

    let err = client
        .execute(
            Method::GET,
            "user",
            &[],
            RequestBody::Empty,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    match err {
        ServiceDeskError::RetryExhausted { attempts, last } => {
            assert_eq!(attempts, 3);
            assert!(matches!(*last, ServiceDeskError::Transport(_)));
        }
        other => panic!("expected RetryExhausted, got {other:?}"),
    }
}
