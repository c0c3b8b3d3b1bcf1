//! Integration tests: spam detection endpoints, graph lookups, error mapping.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use caller_api::config::ApiConfig;
use caller_api::server::{self, AppState};
use caller_graph::{GraphStore, InMemoryGraphStore};
use caller_spam::SpamDetectionService;
use caller_types::{CallMetadata, ContactMetadata};
use http_body_util::BodyExt;
use serde_json::json;
use std::sync::Arc;
use tower::util::ServiceExt;

/// U is saved by three users and placed one short answered call; X is unknown.
async fn seeded_graph() -> Arc<InMemoryGraphStore> {
    let graph = Arc::new(InMemoryGraphStore::new());
    graph.add_node("U", Some("Umesh")).await.unwrap();
    for saver in ["A", "B", "C"] {
        graph
            .add_edge(saver, "U", ContactMetadata::named("Umesh").into())
            .await
            .unwrap();
    }
    graph
        .add_edge("U", "A", CallMetadata::new(true, 10, chrono::Utc::now()).into())
        .await
        .unwrap();
    graph
        .add_edge("B", "U", CallMetadata::new(false, 0, chrono::Utc::now()).into())
        .await
        .unwrap();
    graph
}

async fn test_app() -> axum::Router {
    let graph = seeded_graph().await;
    let spam = ApiConfig::default().build_spam_service(graph.clone());
    server::router(Arc::new(AppState { graph, spam }))
}

async fn send(app: &axum::Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let body = res.into_body().collect().await.unwrap().to_bytes();
    let j = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, j)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_reports_healthy() {
    let app = test_app().await;
    let (status, j) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(j, json!({"status": "healthy"}));
}

#[tokio::test]
async fn detect_scores_a_trusted_number() {
    let app = test_app().await;
    let (status, j) = send(
        &app,
        post_json("/api/v1/spam/detect", json!({"phone_number": "U"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(j["phone_number"], "U");
    assert_eq!(j["is_spam"], false);
    assert!(j.get("user_phone_number").is_none());
    let scores = j["rule_scores"].as_array().unwrap();
    assert_eq!(scores.len(), 3);
    assert_eq!(scores[0]["rule_name"], "contact_count_rule");
    assert_eq!(scores[0]["reason"], "Phone number saved by 3 users (trusted)");
    assert_eq!(
        scores[1]["reason"],
        "Found 1 suspicious calls (answered but <=30s) out of 2 total calls in last 1h0m0s"
    );
    let avg = j["average_score"].as_f64().unwrap();
    assert!((avg - 0.4 / 3.0).abs() < 1e-9);
    assert!(j["timestamp"].as_str().is_some());
}

#[tokio::test]
async fn score_endpoint_takes_query_parameters() {
    let app = test_app().await;
    let (status, j) = send(
        &app,
        get("/api/v1/spam/score?phone_number=X&user_phone_number=A"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(j["user_phone_number"], "A");
    let second = &j["rule_scores"][2];
    assert_eq!(second["rule_name"], "second_level_contact_rule");
    assert_eq!(second["score"], 0.5);
}

#[tokio::test]
async fn missing_phone_number_is_a_bad_request() {
    let app = test_app().await;
    let (status, j) = send(&app, post_json("/api/v1/spam/detect", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(j["error"], "VALIDATION");
    assert_eq!(j["message"], "phone_number is required");

    let (status, _) = send(&app, get("/api/v1/spam/score")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_body_is_a_bad_request() {
    let app = test_app().await;
    let req = Request::builder()
        .method("POST")
        .uri("/api/v1/spam/detect")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, j) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(j["error"], "DESERIALIZATION");
}

#[tokio::test]
async fn no_rules_is_a_server_error() {
    let graph = Arc::new(InMemoryGraphStore::new());
    let spam = SpamDetectionService::new(graph.clone(), 0.5);
    let app = server::router(Arc::new(AppState { graph, spam }));
    let (status, j) = send(
        &app,
        post_json("/api/v1/spam/detect", json!({"phone_number": "1"})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(j["error"], "CONFIGURATION");
}

#[tokio::test]
async fn rules_are_listed_in_order() {
    let app = test_app().await;
    let (status, j) = send(&app, get("/api/v1/spam/rules")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(j["count"], 3);
    assert_eq!(
        j["rules"],
        json!([
            "contact_count_rule",
            "call_pattern_rule",
            "second_level_contact_rule"
        ])
    );
}

#[tokio::test]
async fn node_lookup_and_not_found() {
    let app = test_app().await;
    let (status, j) = send(&app, get("/api/v1/graph/nodes/U")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(j, json!({"phone_number": "U", "name": "Umesh"}));

    let (status, j) = send(&app, get("/api/v1/graph/nodes/nobody")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(j["error"], "NOT_FOUND");
}

#[tokio::test]
async fn call_history_with_filters() {
    let app = test_app().await;
    let (status, j) = send(&app, get("/api/v1/graph/calls/U?direction=both")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(j["count"], 2);

    let (_, j) = send(&app, get("/api/v1/graph/calls/U")).await;
    assert_eq!(j["count"], 1);
    assert_eq!(j["edges"][0]["to"], "A");
    assert_eq!(j["edges"][0]["type"], "call");
    assert_eq!(j["edges"][0]["properties"]["duration_in_seconds"], 10);

    let (_, j) = send(
        &app,
        get("/api/v1/graph/calls/U?direction=incoming&is_answered=true"),
    )
    .await;
    assert_eq!(j["count"], 0);

    let (status, j) = send(&app, get("/api/v1/graph/calls/U?direction=sideways")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(j["error"], "VALIDATION");
}
