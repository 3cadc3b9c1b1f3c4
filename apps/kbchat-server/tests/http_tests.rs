use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use kbchat_core::config::Settings;
use kbchat_pipeline::testing::{hit, Harness, ScriptedGenerator, ScriptedIndex, ScriptedTranslator};
use kbchat_pipeline::{REFUSAL, TEMPORARY_ISSUE};
use kbchat_server::build_router;

fn harness(generator: ScriptedGenerator) -> Harness {
    let index = ScriptedIndex::with_hits(vec![hit(
        "vitality.pdf",
        0.8123,
        "To join Vitality, activate your membership in the Discovery app and complete a health check.",
    )]);
    Harness::new(ScriptedTranslator::detecting("en"), index, generator)
}

fn app(h: &Harness) -> axum::Router { build_router(Arc::new(h.pipeline(&Settings::default()).unwrap())) }

fn post(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn health_reports_ok() {
    let h = harness(ScriptedGenerator::replying("unused"));
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(app(&h), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn answers_in_scope_question() {
    let h = harness(ScriptedGenerator::replying("Activate Vitality in the app."));
    let (status, body) = send(
        app(&h),
        post(r#"{"message":"How do I join Vitality?","sessionId":"s-42","meta":{"channel":"web"}}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["text"], "Activate Vitality in the app.");
    assert_eq!(body["refused"], false);
    assert_eq!(body["intent"]["label"], "in");
    assert_eq!(body["citations"][0]["doc"], "vitality.pdf");
    assert!((body["citations"][0]["score"].as_f64().unwrap() - 0.81).abs() < 1e-6);
    assert_eq!(body["sessionId"], "s-42");
    assert_eq!(h.telemetry.events()[0].channel.as_deref(), Some("web"));
}

#[tokio::test]
async fn off_topic_question_is_refused() {
    let h = harness(ScriptedGenerator::replying("unused"));
    let (status, body) = send(app(&h), post(r#"{"message":"What's the weather today?"}"#)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["text"], REFUSAL);
    assert_eq!(body["refused"], true);
    assert!(body.get("citations").is_none());
    assert_eq!(h.index.calls() + h.generator.calls(), 0);
}

#[tokio::test]
async fn invalid_bodies_are_rejected_before_any_collaborator_call() {
    let h = harness(ScriptedGenerator::replying("unused"));
    for body in ["{}", r#"{"message":""}"#, r#"{"message":"   "}"#, r#"{"message":5}"#, "not json"] {
        let (status, payload) = send(app(&h), post(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert!(payload["error"].is_string());
    }
    assert_eq!(h.collaborator_calls(), 0);
    assert!(h.telemetry.events().is_empty());
}

#[tokio::test]
async fn get_runs_the_same_pipeline() {
    let h = harness(ScriptedGenerator::replying("Activate Vitality."));
    let req = Request::builder()
        .uri("/api/chat?message=How%20do%20I%20join%20Vitality%3F&lang=en&sessionId=g-1")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app(&h), req).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["text"], "Activate Vitality.");
    assert_eq!(body["sessionId"], "g-1");
    assert_eq!(h.translator.detect_calls(), 0);
}

#[tokio::test]
async fn get_without_message_is_rejected() {
    let h = harness(ScriptedGenerator::replying("unused"));
    let req = Request::builder().uri("/api/chat?lang=en").body(Body::empty()).unwrap();
    let (status, body) = send(app(&h), req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Message parameter is required");
    assert_eq!(h.collaborator_calls(), 0);
}

#[tokio::test]
async fn malformed_query_string_gets_a_json_error() {
    let h = harness(ScriptedGenerator::replying("unused"));
    let req = Request::builder().uri("/api/chat?message=join&message=vitality").body(Body::empty()).unwrap();
    let (status, body) = send(app(&h), req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Invalid query string"), "{body}");
    assert_eq!(h.collaborator_calls(), 0);
}

#[tokio::test]
async fn generation_failure_maps_to_generic_500() {
    let h = harness(ScriptedGenerator::failing());
    let (status, body) = send(app(&h), post(r#"{"message":"How do I join Vitality?"}"#)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "text": TEMPORARY_ISSUE, "refused": true, "error": "Internal server error" }));
    assert_eq!(h.telemetry.events().len(), 1);
}
