//! Router-level tests: status codes, signature gates and reply shapes.

use std::fmt::Write as _;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tower::ServiceExt;

use review_herald::config::GlobalConfig;
use review_herald::models::TaskStatus;
use review_herald::server::router;
use review_herald::slack::blocks::ACTION_WATCH;
use review_herald::slack::signature;

use super::test_helpers::{
    block_action_json, harness, harness_with, jst, pr_event_json, seed_config, Harness,
    WEBHOOK_SECRET,
};

const SLACK_SECRET: &str = "slack-signing-secret";

fn github_signature(body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).expect("hmac key");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

fn form_encode(pairs: &[(&str, &str)]) -> String {
    let mut out = String::new();
    for (i, (key, value)) in pairs.iter().enumerate() {
        if i > 0 {
            out.push('&');
        }
        for (j, part) in [key, value].into_iter().enumerate() {
            if j > 0 {
                out.push('=');
            }
            for byte in part.bytes() {
                if byte.is_ascii_alphanumeric() || b"-_.~".contains(&byte) {
                    out.push(char::from(byte));
                } else {
                    write!(out, "%{byte:02X}").expect("write");
                }
            }
        }
    }
    out
}

async fn send(h: &Harness, request: Request<Body>) -> Response {
    router(Arc::clone(&h.state))
        .oneshot(request)
        .await
        .expect("router is infallible")
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

fn webhook(event: &str, body: &str, signature: &str) -> Request<Body> {
    Request::post("/webhook")
        .header("content-type", "application/json")
        .header("x-github-event", event)
        .header("x-github-delivery", "d-1")
        .header("x-hub-signature-256", signature)
        .body(Body::from(body.to_owned()))
        .expect("request")
}

fn form(path: &str, body: String) -> Request<Body> {
    Request::post(path)
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .expect("request")
}

// ── Health ──────────────────────────────────────────────────

#[tokio::test]
async fn health_answers_ok() {
    let h = harness(jst(2024, 8, 27, 11, 0)).await;
    let request = Request::get("/health").body(Body::empty()).expect("request");

    let response = send(&h, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "ok");
}

// ── GitHub webhook ──────────────────────────────────────────

#[tokio::test]
async fn webhook_rejects_bad_signature() {
    let h = harness(jst(2024, 8, 27, 11, 0)).await;
    let response = send(&h, webhook("ping", "{}", "sha256=00")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn webhook_accepts_signed_ping() {
    let h = harness(jst(2024, 8, 27, 11, 0)).await;
    let body = r#"{"zen":"Keep it logically awesome."}"#;
    let response = send(&h, webhook("ping", body, &github_signature(body.as_bytes()))).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn webhook_rejects_malformed_payload() {
    let h = harness(jst(2024, 8, 27, 11, 0)).await;
    let body = "{not json";
    let response =
        send(&h, webhook("pull_request", body, &github_signature(body.as_bytes()))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn signed_label_event_creates_a_task() {
    let h = harness(jst(2024, 8, 27, 11, 0)).await;
    seed_config(&h.state, "C", "needs-review", &["U1"], ("10:00", "19:00")).await;
    let body = pr_event_json("labeled", "needs-review", "o/r", 3, &["needs-review"]).to_string();

    let response =
        send(&h, webhook("pull_request", &body, &github_signature(body.as_bytes()))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let tasks = h.state.tasks().find_all_by_pr("o/r", 3).await.expect("tasks");
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].status, TaskStatus::InReview);
}

// ── Slack events ────────────────────────────────────────────

#[tokio::test]
async fn url_verification_echoes_challenge() {
    let h = harness(jst(2024, 8, 27, 11, 0)).await;
    let body = r#"{"type":"url_verification","challenge":"abc123"}"#;
    let request = Request::post("/slack/events")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .expect("request");

    let response = send(&h, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "abc123");
}

#[tokio::test]
async fn channel_archive_event_retires_configs() {
    let h = harness(jst(2024, 8, 27, 11, 0)).await;
    let cfg = seed_config(&h.state, "C", "needs-review", &["U1"], ("10:00", "19:00")).await;
    let body = r#"{"type":"event_callback","event":{"type":"channel_archive","channel":"C"}}"#;
    let request = Request::post("/slack/events")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .expect("request");

    let response = send(&h, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let cfg = h.state.configs().get_by_id(&cfg.id).await.expect("get").expect("row");
    assert!(!cfg.active);
}

// ── Slash command and actions ───────────────────────────────

#[tokio::test]
async fn slash_command_replies_with_ephemeral_json() {
    let h = harness(jst(2024, 8, 27, 11, 0)).await;
    let body = form_encode(&[
        ("command", "/review"),
        ("text", "show"),
        ("channel_id", "C"),
        ("user_id", "U0"),
    ]);

    let response = send(&h, form("/slack/command", body)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let reply: serde_json::Value =
        serde_json::from_str(&body_text(response).await).expect("json reply");
    assert_eq!(reply["response_type"], "ephemeral");
    assert!(reply["text"].as_str().expect("text").contains("*Label:* `needs-review`"));
}

#[tokio::test]
async fn slash_command_without_channel_is_bad_request() {
    let h = harness(jst(2024, 8, 27, 11, 0)).await;
    let body = form_encode(&[("text", "show")]);

    let response = send(&h, form("/slack/command", body)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn action_for_unknown_task_is_not_found() {
    let h = harness(jst(2024, 8, 27, 11, 0)).await;
    let payload = block_action_json("U1", "C", "1.1", ACTION_WATCH, "missing").to_string();
    let body = form_encode(&[("payload", &payload)]);

    let response = send(&h, form("/slack/action", body)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ── Slack request signing ───────────────────────────────────

async fn signed_harness() -> Harness {
    let mut config = GlobalConfig::default();
    config.slack.signing_secret = Some(SLACK_SECRET.into());
    harness_with(jst(2024, 8, 27, 11, 0), config).await
}

fn signed_command(timestamp: i64, signature_override: Option<&str>) -> Request<Body> {
    let body = form_encode(&[("text", "help"), ("channel_id", "C"), ("user_id", "U0")]);
    let ts = timestamp.to_string();
    let sig = match signature_override {
        Some(sig) => sig.to_owned(),
        None => signature::sign(SLACK_SECRET, &ts, body.as_bytes()).expect("sign"),
    };
    Request::post("/slack/command")
        .header("content-type", "application/x-www-form-urlencoded")
        .header("x-slack-request-timestamp", ts)
        .header("x-slack-signature", sig)
        .body(Body::from(body))
        .expect("request")
}

#[tokio::test]
async fn signed_slack_request_passes() {
    let h = signed_harness().await;
    let response = send(&h, signed_command(h.now().timestamp(), None)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn forged_slack_signature_is_rejected() {
    let h = signed_harness().await;
    let response = send(&h, signed_command(h.now().timestamp(), Some("v0=deadbeef"))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn stale_slack_timestamp_is_rejected() {
    let h = signed_harness().await;
    let response = send(&h, signed_command(h.now().timestamp() - 600, None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn health_skips_slack_signature() {
    let h = signed_harness().await;
    let request = Request::get("/health").body(Body::empty()).expect("request");
    assert_eq!(send(&h, request).await.status(), StatusCode::OK);
}
