//! HTTP ingress: GitHub webhooks, Slack events, slash commands and
//! interactive actions.
//!
//! Every handler answers 200 once the payload is accepted, even when the
//! downstream chat fan-out failed. Interactions are the exception: a
//! missing task is a 404 and a failed root-message update is a 500.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{to_bytes, Body, Bytes};
use axum::extract::rejection::FormRejection;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use crate::github::{handle_delivery, verify_signature, WebhookEvent};
use crate::slack::commands::handle_command;
use crate::slack::events::{handle_event, handle_interaction, EventEnvelope, EventReply, InteractionPayload};
use crate::slack::signature;
use crate::state::AppState;
use crate::{AppError, Result};

/// Largest Slack request body buffered for signature checks.
const MAX_SLACK_BODY: usize = 1024 * 1024;

type SharedState = Arc<AppState>;

/// Build the application router.
#[must_use]
pub fn router(state: SharedState) -> Router {
    let slack = Router::new()
        .route("/slack/events", post(slack_events))
        .route("/slack/command", post(slack_command))
        .route("/slack/action", post(slack_action))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            verify_slack_request,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/webhook", post(github_webhook))
        .merge(slack)
        .with_state(state)
}

/// Bind the listener and serve until `cancel` fires.
///
/// # Errors
///
/// Returns `AppError::Config` if the listener cannot bind or the server
/// fails.
pub async fn serve(state: SharedState, cancel: CancellationToken) -> Result<()> {
    let bind = SocketAddr::new(state.config.http.bind_address, state.config.http.port);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::Config(format!("failed to bind {bind}: {err}")))?;

    info!(%bind, "http listener started");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|err| AppError::Config(format!("http server error: {err}")))?;

    info!("http listener shut down");
    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

async fn github_webhook(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode> {
    verify_signature(
        &state.config.github.webhook_secret,
        &body,
        header(&headers, "x-hub-signature-256"),
    )?;

    let event_type = header(&headers, "x-github-event")
        .ok_or_else(|| AppError::Validation("missing X-GitHub-Event header".into()))?;
    let delivery = header(&headers, "x-github-delivery").unwrap_or("-").to_owned();
    let event = WebhookEvent::parse(event_type, &body)?;

    let span = tracing::info_span!("github_delivery", delivery = %delivery, event = event_type);
    if let Err(err) = handle_delivery(&state, event).instrument(span).await {
        warn!(%err, delivery, "webhook delivery failed");
    }
    Ok(StatusCode::OK)
}

/// Verify Slack's `v0` signature when a signing secret is configured.
async fn verify_slack_request(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(secret) = state.config.slack.signing_secret.as_deref() else {
        return next.run(request).await;
    };

    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, MAX_SLACK_BODY).await {
        Ok(bytes) => bytes,
        Err(err) => {
            return AppError::Validation(format!("unreadable body: {err}")).into_response();
        }
    };

    if let Err(err) = signature::verify(
        secret,
        header(&parts.headers, "x-slack-request-timestamp"),
        header(&parts.headers, "x-slack-signature"),
        &bytes,
        state.clock.now(),
    ) {
        warn!(%err, path = %parts.uri.path(), "rejected slack request");
        return err.into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

async fn slack_events(State(state): State<SharedState>, body: Bytes) -> Result<Response> {
    let envelope: EventEnvelope = serde_json::from_slice(&body)?;
    match handle_event(&state, envelope).await? {
        EventReply::Challenge(challenge) => Ok(challenge.into_response()),
        EventReply::Ack => Ok(StatusCode::OK.into_response()),
    }
}

/// Slash command form body.
#[derive(Debug, Deserialize)]
struct CommandForm {
    #[serde(default)]
    command: String,
    #[serde(default)]
    text: String,
    channel_id: String,
    user_id: String,
}

async fn slack_command(
    State(state): State<SharedState>,
    form: std::result::Result<Form<CommandForm>, FormRejection>,
) -> Result<Json<serde_json::Value>> {
    let Form(form) = form.map_err(|err| AppError::Validation(err.body_text()))?;
    debug!(command = %form.command, channel = %form.channel_id, "slash command");

    let reply = handle_command(&state, &form.channel_id, &form.user_id, &form.text).await;
    Ok(Json(serde_json::json!({
        "response_type": "ephemeral",
        "text": reply,
    })))
}

/// Interaction form body.
#[derive(Debug, Deserialize)]
struct ActionForm {
    payload: String,
}

async fn slack_action(
    State(state): State<SharedState>,
    form: std::result::Result<Form<ActionForm>, FormRejection>,
) -> Result<StatusCode> {
    let Form(form) = form.map_err(|err| AppError::Validation(err.body_text()))?;
    let payload = InteractionPayload::from_json(&form.payload)?;
    handle_interaction(&state, &payload).await?;
    Ok(StatusCode::OK)
}
