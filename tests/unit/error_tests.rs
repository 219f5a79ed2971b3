use axum::http::StatusCode;
use axum::response::IntoResponse;

use review_herald::errors::{classify_error, classify_slack_code, ChatErrorKind};
use review_herald::AppError;

#[test]
fn display_prefixes_variant() {
    assert_eq!(AppError::Config("bad".into()).to_string(), "config: bad");
    assert_eq!(AppError::Db("locked".into()).to_string(), "db: locked");
    assert_eq!(AppError::NotFound("task".into()).to_string(), "not found: task");
    assert_eq!(
        AppError::chat(ChatErrorKind::Transient, "ratelimited").to_string(),
        "chat (Transient): ratelimited"
    );
}

#[test]
fn channel_loss_codes_are_channel_related() {
    for code in ["not_in_channel", "channel_not_found", "is_archived", "missing_scope"] {
        assert_eq!(classify_slack_code(code), ChatErrorKind::ChannelRelated, "{code}");
    }
}

#[test]
fn throttling_and_outages_are_transient() {
    for code in ["ratelimited", "internal_error", "service_unavailable", "request_timeout"] {
        assert_eq!(classify_slack_code(code), ChatErrorKind::Transient, "{code}");
    }
}

#[test]
fn unknown_codes_are_fatal() {
    assert_eq!(classify_slack_code("invalid_blocks"), ChatErrorKind::Fatal);
    assert_eq!(classify_slack_code(""), ChatErrorKind::Fatal);
}

#[test]
fn classify_error_reads_chat_kind() {
    let err = AppError::chat(ChatErrorKind::ChannelRelated, "is_archived");
    assert_eq!(classify_error(&err), ChatErrorKind::ChannelRelated);
    assert_eq!(classify_error(&AppError::Io("reset".into())), ChatErrorKind::Transient);
    assert_eq!(classify_error(&AppError::Db("x".into())), ChatErrorKind::Fatal);
}

#[test]
fn http_status_mapping() {
    let cases = [
        (AppError::Validation("x".into()), StatusCode::BAD_REQUEST),
        (AppError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
        (AppError::NotFound("x".into()), StatusCode::NOT_FOUND),
        (AppError::chat(ChatErrorKind::Fatal, "x"), StatusCode::INTERNAL_SERVER_ERROR),
        (AppError::Db("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
    ];
    for (err, status) in cases {
        assert_eq!(err.into_response().status(), status);
    }
}

#[test]
fn json_errors_become_validation() {
    let err: AppError = serde_json::from_str::<serde_json::Value>("{").expect_err("bad").into();
    assert!(matches!(err, AppError::Validation(msg) if msg.starts_with("invalid json")));
}
