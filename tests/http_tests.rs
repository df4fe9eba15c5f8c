mod common;

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use common::{ScriptedClient, MAPPING_REPLY, NARRATIVE_REPLY, SAMPLE_CSV};
use report_services::config::Config;
use report_services::routes;
use report_services::services::report_store::ReportStore;
use report_services::AppState;
use serde_json::Value;
use tower::ServiceExt;

const BOUNDARY: &str = "report-boundary";

async fn test_app(client: Arc<ScriptedClient>) -> Router {
    let config = Config::from_lookup(|key| match key {
        "OPENAI_API_KEY" => Some("test-key".to_string()),
        _ => None,
    })
    .unwrap();
    let store = ReportStore::open_in_memory().await.unwrap();
    routes::app(Arc::new(AppState::new(config, client, store)))
}

fn upload(user: Option<&str>, filename: &str, data: &str) -> Request<Body> {
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\n\
         Content-Type: application/octet-stream\r\n\r\n{d}\r\n--{b}--\r\n",
        b = BOUNDARY,
        f = filename,
        d = data
    );
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/analyze")
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", BOUNDARY));
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    builder.body(Body::from(body)).unwrap()
}

fn get(uri: &str, user: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-user-id", user)
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_check_answers_ok() {
    let app = test_app(ScriptedClient::new(vec![])).await;
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"OK");
}

#[tokio::test]
async fn upload_without_identity_is_unauthorized() {
    let client = ScriptedClient::new(vec![]);
    let app = test_app(client.clone()).await;

    let response = app.oneshot(upload(None, "sales.csv", SAMPLE_CSV)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(client.request_count(), 0);
}

#[tokio::test]
async fn upload_then_fetch_and_list() {
    let client = ScriptedClient::new(vec![Ok(MAPPING_REPLY), Ok(NARRATIVE_REPLY)]);
    let app = test_app(client).await;

    let response = app.clone().oneshot(upload(Some("alice"), "sales.csv", SAMPLE_CSV)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let created = json_body(response).await;
    assert_eq!(created["status"], "completed");
    assert_eq!(created["filename"], "sales.csv");
    assert_eq!(created["analysis"]["summary"]["total_revenue"], 130.0);
    let report_id = created["report_id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(get(&format!("/api/report/{}", report_id), "alice"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["report_id"], report_id.as_str());

    let response = app.clone().oneshot(get("/api/reports", "alice")).await.unwrap();
    let listed = json_body(response).await;
    assert_eq!(listed.as_array().map(Vec::len), Some(1));

    // Someone else's report looks like a missing one
    let response = app
        .clone()
        .oneshot(get(&format!("/api/report/{}", report_id), "bob"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Second upload the same day
    let response = app.oneshot(upload(Some("alice"), "sales.csv", SAMPLE_CSV)).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(json_body(response).await["error"].as_str().unwrap().contains("Daily limit"));
}

#[tokio::test]
async fn unsupported_upload_is_a_bad_request() {
    let app = test_app(ScriptedClient::new(vec![])).await;

    let response = app.oneshot(upload(Some("alice"), "notes.txt", "hello")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(response).await["error"],
        "Unsupported file format. Please upload CSV or Excel."
    );
}

#[tokio::test]
async fn mapping_outage_is_a_bad_gateway() {
    let app = test_app(ScriptedClient::new(vec![Err("upstream down")])).await;

    let response = app.oneshot(upload(Some("alice"), "sales.csv", SAMPLE_CSV)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}
