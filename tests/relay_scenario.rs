//! End-to-end scenario against the real router: issue a secret for alice,
//! reject a wrong secret, register her key, and list it. Forum delivery is a
//! wiremock Discourse.

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header::CONTENT_TYPE},
};
use http_body_util::BodyExt;
use keyrelay::{
    delivery::{DiscourseMessenger, MessageDelivery},
    relay::{self, handlers::RateLimit, rate_limit::FixedWindowLimiter},
    replicate::DirtyFlag,
    store::CredentialStore,
};
use std::sync::Arc;
use tokio::sync::watch;
use tower::ServiceExt;
use ulid::Ulid;
use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct TestRelay {
    app: Router,
    store: Arc<CredentialStore>,
    dirty_rx: watch::Receiver<u64>,
    _forum: MockServer,
}

async fn mount_forum(server: &MockServer, expected_pms: u64) {
    Mock::given(method("GET"))
        .and(path("/session/csrf.json"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "csrf": "tok-123" })),
        )
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/posts.json"))
        .and(body_string_contains("archetype=private_message"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .expect(expected_pms)
        .mount(server)
        .await;
}

async fn test_relay(expected_pms: u64) -> TestRelay {
    let forum = MockServer::start().await;
    mount_forum(&forum, expected_pms).await;
    relay_with_forum(forum).await
}

async fn relay_with_forum(forum: MockServer) -> TestRelay {
    let store = Arc::new(
        CredentialStore::open(
            std::env::temp_dir().join(format!("keyrelay-scenario-{}.db", Ulid::new())),
        )
        .await
        .expect("store"),
    );

    let delivery: Arc<dyn MessageDelivery> = Arc::new(
        DiscourseMessenger::new(Url::parse(&forum.uri()).expect("forum url"), None, None, None)
            .expect("messenger"),
    );

    let (dirty, dirty_rx) = DirtyFlag::new();
    let limit = RateLimit {
        limiter: Arc::new(FixedWindowLimiter::new()),
        ip_header: "X-Forwarded-For".to_string(),
    };

    let app = relay::router(store.clone(), delivery, dirty, limit);

    TestRelay {
        app,
        store,
        dirty_rx,
        _forum: forum,
    }
}

fn post_json(uri: &str, client: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .header("X-Forwarded-For", client)
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn alice_issue_register_and_list() {
    let mut relay = test_relay(1).await;

    // Issue a secret for alice.
    let response = relay
        .app
        .clone()
        .oneshot(post_json(
            "/getSecret",
            "203.0.113.7",
            serde_json::json!({ "username": "alice" }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        serde_json::json!({ "message": "Secret generated and PM sent for alice" })
    );

    // The store now has a 10-digit numeric pending secret and no key.
    let record = relay
        .store
        .record("alice")
        .await
        .expect("query")
        .expect("record");
    let secret = record.pending_secret.clone().expect("pending secret");
    assert_eq!(secret.len(), 10);
    assert!(secret.chars().all(|c| c.is_ascii_digit()));
    assert_eq!(record.public_key, None);

    // The mutation marked the store dirty for the replicator.
    assert!(relay.dirty_rx.has_changed().expect("flag alive"));
    relay.dirty_rx.borrow_and_update();

    // Wrong secret: 403, record untouched.
    let response = relay
        .app
        .clone()
        .oneshot(post_json(
            "/addKey",
            "203.0.113.8",
            serde_json::json!({ "username": "alice", "secret": "0", "public_key": "PK" }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        json_body(response).await,
        serde_json::json!({ "error": "Invalid secret" })
    );
    assert_eq!(
        relay
            .store
            .record("alice")
            .await
            .expect("query")
            .expect("record")
            .pending_secret
            .as_deref(),
        Some(secret.as_str())
    );
    assert!(!relay.dirty_rx.has_changed().expect("flag alive"));

    // Correct secret: key registered, secret cleared, dirty marked.
    let response = relay
        .app
        .clone()
        .oneshot(post_json(
            "/addKey",
            "203.0.113.9",
            serde_json::json!({ "username": "alice", "secret": secret, "public_key": "PK" }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        serde_json::json!({ "message": "RSA key for alice added successfully" })
    );

    let record = relay
        .store
        .record("alice")
        .await
        .expect("query")
        .expect("record");
    assert_eq!(record.public_key.as_deref(), Some("PK"));
    assert_eq!(record.pending_secret, None);
    assert!(relay.dirty_rx.has_changed().expect("flag alive"));

    // Listing returns the registered key.
    let response = relay
        .app
        .clone()
        .oneshot(post_json(
            "/getPublicKeys",
            "203.0.113.10",
            serde_json::json!({}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        serde_json::json!({ "alice": "PK" })
    );
}

#[tokio::test]
async fn delivery_failure_still_reports_secret_issued() {
    // Forum is down: the CSRF fetch fails, so no PM can be sent.
    let forum = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/session/csrf.json"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&forum)
        .await;
    let relay = relay_with_forum(forum).await;

    let response = relay
        .app
        .clone()
        .oneshot(post_json(
            "/getSecret",
            "203.0.113.7",
            serde_json::json!({ "username": "alice" }),
        ))
        .await
        .expect("response");

    // The secret was persisted, so issuance is reported as a success even
    // though delivery failed.
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        serde_json::json!({ "message": "Secret generated and PM sent for alice" })
    );

    let record = relay
        .store
        .record("alice")
        .await
        .expect("query")
        .expect("record");
    let secret = record.pending_secret.expect("pending secret");
    assert_eq!(secret.len(), 10);
    assert!(secret.chars().all(|c| c.is_ascii_digit()));
}

#[tokio::test]
async fn missing_username_is_rejected_without_mutation() {
    let relay = test_relay(0).await;

    let response = relay
        .app
        .clone()
        .oneshot(post_json(
            "/getSecret",
            "203.0.113.7",
            serde_json::json!({}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(response).await,
        serde_json::json!({ "error": "Username is required" })
    );
    assert!(!relay.dirty_rx.has_changed().expect("flag alive"));
}

#[tokio::test]
async fn add_key_with_missing_fields_is_rejected() {
    let relay = test_relay(0).await;

    let response = relay
        .app
        .clone()
        .oneshot(post_json(
            "/addKey",
            "203.0.113.7",
            serde_json::json!({ "username": "alice", "secret": "123" }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(response).await,
        serde_json::json!({ "error": "username, secret, and public_key are required" })
    );
}

#[tokio::test]
async fn second_secret_request_from_same_client_is_throttled() {
    let relay = test_relay(1).await;

    let response = relay
        .app
        .clone()
        .oneshot(post_json(
            "/getSecret",
            "203.0.113.7",
            serde_json::json!({ "username": "alice" }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    // Same client, inside the 20-minute window: rejected before the issuer,
    // so no second PM reaches the forum (the mock expects exactly one).
    let response = relay
        .app
        .clone()
        .oneshot(post_json(
            "/getSecret",
            "203.0.113.7",
            serde_json::json!({ "username": "alice" }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        json_body(response).await,
        serde_json::json!({ "error": "Rate limit exceeded" })
    );
}

#[tokio::test]
async fn health_and_openapi_are_served() {
    let relay = test_relay(0).await;

    let response = relay
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("X-App"));

    let response = relay
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/openapi.json")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let doc = json_body(response).await;
    assert!(doc.get("paths").and_then(|p| p.get("/addKey")).is_some());
}
