//! HTTP surface through the router, relay and CMS mocked

mod common;

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tower::util::ServiceExt;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lead_gateway::content::{ContentLimits, ContentService, SanityClient, queries};
use lead_gateway::handlers::router;
use lead_gateway::state::AppState;

struct TestApp {
    app: Router,
    fx: common::Fixture,
}

fn setup(relay: &MockServer, cms: &MockServer) -> TestApp {
    let fx = common::fixture(relay);
    let sanity = SanityClient::new(reqwest::Client::new(), "abc123", "production").with_base_url(cms.uri());
    let content = ContentService::new(Arc::new(sanity), fx.limiter.clone(), ContentLimits::default());

    let state = Arc::new(AppState {
        content: Arc::new(content),
        forms: fx.deps.clone(),
        site_url: "https://learnersacademy.com".to_string(),
        shutdown: CancellationToken::new(),
    });

    TestApp {
        app: router(state),
        fx,
    }
}

fn post_json(uri: &str, client: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-forwarded-for", client)
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).expect("request")
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

fn demo_body() -> Value {
    json!({
        "studentName": "Asha Rao",
        "phone": "9876543210",
        "class": "10",
        "subjectOfInterest": "Mathematics"
    })
}

async fn mount_relay_ok(relay: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/submit"))
        .respond_with(ResponseTemplate::new(200))
        .mount(relay)
        .await;
}

#[tokio::test]
async fn demo_booking_then_cooldown() {
    let relay = MockServer::start().await;
    let cms = MockServer::start().await;
    mount_relay_ok(&relay).await;
    let t = setup(&relay, &cms);

    let response = t
        .app
        .clone()
        .oneshot(post_json("/api/demo", "203.0.113.7", demo_body()))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "submitted");
    assert!(body.get("download").is_none());

    let response = t
        .app
        .clone()
        .oneshot(post_json("/api/demo", "203.0.113.7", demo_body()))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()["retry-after"], "30");
    let body = json_body(response).await;
    assert_eq!(body["error"], "rate_limited");
    assert_eq!(body["retryAfterSeconds"], 30);

    // another visitor is unaffected
    let response = t
        .app
        .clone()
        .oneshot(post_json("/api/demo", "198.51.100.4", demo_body()))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(t.fx.limiter.remaining_attempts("demo_submission:198.51.100.4", 10), 9);
}

#[tokio::test]
async fn missing_class_is_unprocessable() {
    let relay = MockServer::start().await;
    let cms = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&relay)
        .await;
    let t = setup(&relay, &cms);

    let response = t
        .app
        .clone()
        .oneshot(post_json(
            "/api/demo",
            "203.0.113.7",
            json!({ "studentName": "Asha Rao", "phone": "9876543210" }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    assert_eq!(body["error"], "validation");
    assert_eq!(body["message"], "Please fill in Class.");
}

#[tokio::test]
async fn relay_failure_is_bad_gateway() {
    let relay = MockServer::start().await;
    let cms = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&relay)
        .await;
    let t = setup(&relay, &cms);

    let response = t
        .app
        .clone()
        .oneshot(post_json("/api/demo", "203.0.113.7", demo_body()))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = json_body(response).await;
    assert_eq!(body["error"], "relay");
}

#[tokio::test]
async fn resource_download_hands_out_file() {
    let relay = MockServer::start().await;
    let cms = MockServer::start().await;
    mount_relay_ok(&relay).await;
    Mock::given(method("GET"))
        .and(query_param("query", queries::resource_by_slug("x").groq))
        .and(query_param("$slug", "\"physics-notes\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": {
                "_id": "r1",
                "title": "Class 10 Physics Notes",
                "pdfFile": { "asset": { "url": "https://cdn.example.com/files/physics-10.pdf" } },
                "slug": { "current": "physics-notes" },
                "category": "study-material"
            }
        })))
        .mount(&cms)
        .await;
    let t = setup(&relay, &cms);

    let response = t
        .app
        .clone()
        .oneshot(post_json(
            "/api/resources/physics-notes/download",
            "203.0.113.7",
            json!({ "studentName": "Asha Rao", "phone": "98765 43210" }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["download"]["filename"], "Class 10 Physics Notes.pdf");
    assert_eq!(body["download"]["url"], "https://cdn.example.com/files/physics-10.pdf");
    assert_eq!(t.fx.downloads.started.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn resource_without_file_is_not_found() {
    let relay = MockServer::start().await;
    let cms = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&relay)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": { "_id": "r2", "title": "Draft", "slug": { "current": "draft" } }
        })))
        .mount(&cms)
        .await;
    let t = setup(&relay, &cms);

    let response = t
        .app
        .clone()
        .oneshot(post_json(
            "/api/resources/draft/download",
            "203.0.113.7",
            json!({ "studentName": "Asha Rao", "phone": "9876543210" }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["error"], "resource_unavailable");
}

#[tokio::test]
async fn listings_degrade_when_cms_is_down() {
    let relay = MockServer::start().await;
    let cms = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&cms)
        .await;
    let t = setup(&relay, &cms);

    for uri in [
        "/api/teachers",
        "/api/courses",
        "/api/success-stories",
        "/api/posts",
        "/api/resources",
        "/api/resources/downloadable",
    ] {
        let response = t.app.clone().oneshot(get(uri)).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK, "{}", uri);
        assert_eq!(json_body(response).await, json!([]), "{}", uri);
    }

    let response = t.app.clone().oneshot(get("/api/posts/missing")).await.expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn sitemap_is_xml() {
    let relay = MockServer::start().await;
    let cms = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": [] })))
        .mount(&cms)
        .await;
    let t = setup(&relay, &cms);

    let response = t.app.clone().oneshot(get("/sitemap.xml")).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/xml");
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let xml = String::from_utf8(bytes.to_vec()).expect("utf8");
    assert!(xml.contains("<loc>https://learnersacademy.com/teachers</loc>"));
}

#[tokio::test]
async fn health_reports_healthy() {
    let relay = MockServer::start().await;
    let cms = MockServer::start().await;
    let t = setup(&relay, &cms);

    let response = t.app.clone().oneshot(get("/health")).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "healthy");
}
