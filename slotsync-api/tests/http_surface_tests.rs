//! Router-level tests: readiness, webhook authentication and the read
//! endpoints, driven through `tower::ServiceExt::oneshot`.

mod support;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use serde_json::{json, Value};
use slotsync_api::constants::CALENDLY_SIGNATURE_HEADER;
use slotsync_api::{create_router, sign_payload, AppState, WebhookConfig};
use slotsync_test_utils::fixtures::*;
use slotsync_test_utils::*;
use support::{harness, refresher_config, Harness};
use tower::ServiceExt;

const SIGNING_KEY: &str = "whsec_test_signing_key";

fn week() -> CacheKey {
    key_for(RESOURCE, day(2030, 5, 6), 7)
}

fn app(h: &Harness, signing_key: Option<&str>) -> Router {
    let webhook = WebhookConfig {
        signing_key: signing_key.map(str::to_string),
        ..WebhookConfig::default()
    };
    create_router(AppState::new(h.service.clone(), webhook).with_default_resource(RESOURCE))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn webhook_request(body: Vec<u8>, signature: Option<String>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhooks/calendly")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header(CALENDLY_SIGNATURE_HEADER, signature);
    }
    builder.body(Body::from(body)).unwrap()
}

fn created_payload(start: &str, end: &str) -> Vec<u8> {
    json!({
        "event": "invitee.created",
        "payload": {
            "email": "pat@example.com",
            "scheduled_event": {
                "start_time": start,
                "end_time": end,
                "event_type": RESOURCE
            }
        }
    })
    .to_string()
    .into_bytes()
}

// ============================================================================
// HEALTH
// ============================================================================

#[tokio::test]
async fn test_live_is_always_ok() {
    let h = harness(ScriptedProvider::new(), refresher_config(vec![week()]));

    let (status, body) = send(app(&h, None), get("/health/live")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_ready_waits_for_initial_population() {
    let h = harness(ScriptedProvider::new(), refresher_config(vec![week()]));

    let (status, body) = send(app(&h, None), get("/health/ready")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["details"]["refresher"], "stopped");
    assert!(body["details"]["uptime_seconds"].is_u64());

    h.refresher.start().await.unwrap();
    let (status, body) = send(app(&h, None), get("/health/ready")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    h.refresher.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stats_reports_counters() {
    let h = harness(ScriptedProvider::new(), refresher_config(vec![]));
    h.service.get_availability(&week()).await.unwrap();
    h.service.get_availability(&week()).await.unwrap();

    let (status, body) = send(app(&h, None), get("/health/stats")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["hits"], 1);
    assert_eq!(body["misses"], 1);
    assert_eq!(body["hit_rate"], 0.5);
}

// ============================================================================
// WEBHOOKS
// ============================================================================

#[tokio::test]
async fn test_signed_webhook_invalidates_and_refetches() {
    let h = harness(ScriptedProvider::new(), refresher_config(vec![]));
    let key = week();
    let slots = slots_from(RESOURCE, at(2030, 5, 7, 10, 0), 3);
    h.provider.set_availability(&key, slots.clone());
    h.service.get_availability(&key).await.unwrap();
    h.provider.set_availability(&key, slots[1..].to_vec());

    let body = created_payload("2030-05-07T10:00:00Z", "2030-05-07T10:30:00Z");
    let signature = sign_payload(SIGNING_KEY, Utc::now().timestamp(), &body).unwrap();
    let (status, ack) = send(
        app(&h, Some(SIGNING_KEY)),
        webhook_request(body, Some(signature)),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["status"], "processed");
    assert_eq!(ack["affected"], 1);
    assert_eq!(ack["refetched"], 1);
    assert_eq!(h.store.get(&key).unwrap().slots().len(), 2);
}

#[tokio::test]
async fn test_bad_signature_is_rejected_before_parsing() {
    let h = harness(ScriptedProvider::new(), refresher_config(vec![]));
    let key = week();
    h.provider
        .set_availability(&key, slots_from(RESOURCE, at(2030, 5, 7, 10, 0), 3));
    h.service.get_availability(&key).await.unwrap();

    let body = created_payload("2030-05-07T10:00:00Z", "2030-05-07T10:30:00Z");
    let signature = sign_payload("some-other-key", Utc::now().timestamp(), &body).unwrap();
    let (status, error) = send(
        app(&h, Some(SIGNING_KEY)),
        webhook_request(body, Some(signature)),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error["code"], "INVALID_SIGNATURE");
    assert!(h.store.get(&key).is_some());
    assert_eq!(h.provider.fetch_calls(&key), 1);
}

#[tokio::test]
async fn test_missing_signature_is_rejected_when_key_configured() {
    let h = harness(ScriptedProvider::new(), refresher_config(vec![]));
    let body = created_payload("2030-05-07T10:00:00Z", "2030-05-07T10:30:00Z");

    let (status, _) = send(app(&h, Some(SIGNING_KEY)), webhook_request(body, None)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_ping_is_acknowledged() {
    let h = harness(ScriptedProvider::new(), refresher_config(vec![]));

    let (status, ack) = send(
        app(&h, None),
        webhook_request(br#"{"event":"ping"}"#.to_vec(), None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["status"], "ok");
    assert_eq!(ack["message"], "Webhook endpoint is active");
}

#[tokio::test]
async fn test_malformed_webhook_body_is_bad_request() {
    let h = harness(ScriptedProvider::new(), refresher_config(vec![]));

    let (status, error) = send(
        app(&h, None),
        webhook_request(b"{not json".to_vec(), None),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_unknown_event_kind_is_dropped_with_ok() {
    let h = harness(ScriptedProvider::new(), refresher_config(vec![]));
    let body = json!({ "event": "routing_form_submission.created", "payload": {} })
        .to_string()
        .into_bytes();

    let (status, ack) = send(app(&h, None), webhook_request(body, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["status"], "ignored");
}

// ============================================================================
// READ ENDPOINTS
// ============================================================================

#[tokio::test]
async fn test_availability_endpoint_filters_by_time_preference() {
    let h = harness(ScriptedProvider::new(), refresher_config(vec![]));
    let key = week();
    let mut slots = slots_from(RESOURCE, at(2030, 5, 6, 9, 0), 2);
    slots.extend(slots_from(RESOURCE, at(2030, 5, 6, 14, 0), 3));
    h.provider.set_availability(&key, slots);

    let (status, body) = send(
        app(&h, None),
        get("/availability?start=2030-05-06&days=7&time_preference=afternoon"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["slots"].as_array().unwrap().len(), 3);
    assert_eq!(body["cached"], false);
    assert_eq!(body["stale"], false);

    let (_, body) = send(app(&h, None), get("/availability?start=2030-05-06&days=7")).await;
    assert_eq!(body["slots"].as_array().unwrap().len(), 5);
    assert_eq!(body["cached"], true);
}

#[tokio::test]
async fn test_availability_endpoint_rejects_unknown_preference() {
    let h = harness(ScriptedProvider::new(), refresher_config(vec![]));

    let (status, error) = send(
        app(&h, None),
        get("/availability?start=2030-05-06&time_preference=evening"),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["code"], "VALIDATION_FAILED");
}

#[tokio::test]
async fn test_availability_endpoint_rejects_oversized_window() {
    let h = harness(ScriptedProvider::new(), refresher_config(vec![]));

    for days in ["63", "95005783"] {
        let (status, error) = send(
            app(&h, None),
            get(&format!("/availability?start=2026-01-01&days={days}")),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST, "days={days}");
        assert_eq!(error["code"], "VALIDATION_FAILED");
    }
    assert_eq!(h.provider.calls(UpstreamOperation::FetchAvailability), 0);
    assert!(h.store.keys().is_empty());

    let (status, _) = send(app(&h, None), get("/availability?start=2030-05-06&days=62")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_availability_endpoint_reports_unavailable() {
    let h = harness(ScriptedProvider::new(), refresher_config(vec![]));
    h.provider
        .fail_availability(&week(), transient(UpstreamOperation::FetchAvailability));

    let (status, error) = send(app(&h, None), get("/availability?start=2030-05-06&days=7")).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(error["code"], "AVAILABILITY_UNAVAILABLE");
}

#[tokio::test]
async fn test_bookings_search() {
    let h = harness(ScriptedProvider::new(), refresher_config(vec![]));
    h.provider.set_bookings(
        "pat@example.com",
        vec![booking("b-1", "pat@example.com", at(2030, 5, 6, 10, 0))],
    );

    let request = Request::builder()
        .method("POST")
        .uri("/bookings/search")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "email": "pat@example.com" }).to_string()))
        .unwrap();
    let (status, body) = send(app(&h, None), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["bookings"][0]["booking_id"], "b-1");
}
