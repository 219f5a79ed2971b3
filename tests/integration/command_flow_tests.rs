//! Slash commands against the config store.

use review_herald::slack::commands::handle_command;

use super::test_helpers::{harness, jst};

#[tokio::test]
async fn show_reports_a_freshly_set_mention() {
    let h = harness(jst(2024, 8, 27, 11, 0)).await;

    let reply = handle_command(&h.state, "C", "U0", "set-mention <@U42|bob>").await;
    assert!(reply.contains("<@U42>"), "{reply}");

    let reply = handle_command(&h.state, "C", "U0", "show").await;
    assert!(reply.contains("*Mention:* <@U42>"), "{reply}");
    assert!(reply.contains("*Label:* `needs-review`"), "{reply}");
}

#[tokio::test]
async fn repository_filter_add_and_remove() {
    let h = harness(jst(2024, 8, 27, 11, 0)).await;

    handle_command(&h.state, "C", "U0", "add-repo o/r").await;
    let cfg = h
        .state
        .configs()
        .get_by_channel_and_label("C", "needs-review")
        .await
        .expect("get")
        .expect("config");
    assert_eq!(cfg.repository_filter, vec!["o/r".to_owned()]);

    let reply = handle_command(&h.state, "C", "U0", "remove-repo o/r").await;
    assert!(reply.contains("removed"), "{reply}");
    let reply = handle_command(&h.state, "C", "U0", "show").await;
    assert!(reply.contains("*Repositories:* (none)"), "{reply}");

    let reply = handle_command(&h.state, "C", "U0", "remove-repo o/r").await;
    assert!(reply.contains("was not configured"), "{reply}");
}

#[tokio::test]
async fn first_command_creates_config_with_defaults() {
    let h = harness(jst(2024, 8, 27, 11, 0)).await;
    assert!(h.state.configs().list_by_channel("C").await.expect("list").is_empty());

    handle_command(&h.state, "C", "U0", "add-reviewer @U1 <@U2>").await;

    let cfg = h
        .state
        .configs()
        .get_by_channel_and_label("C", "needs-review")
        .await
        .expect("get")
        .expect("config");
    assert!(cfg.active);
    assert_eq!(cfg.reviewer_pool, vec!["U1".to_owned(), "U2".to_owned()]);
    assert_eq!(cfg.timezone, "Asia/Tokyo");
}

#[tokio::test]
async fn quoted_label_selects_its_own_config() {
    let h = harness(jst(2024, 8, 27, 11, 0)).await;

    handle_command(&h.state, "C", "U0", r#""project-a,needs-review" add-reviewer U3"#).await;
    handle_command(&h.state, "C", "U0", "add-reviewer U1").await;

    let configs = h.state.configs().list_by_channel("C").await.expect("list");
    assert_eq!(configs.len(), 2);
    let scoped = configs
        .iter()
        .find(|c| c.label_expression == "project-a,needs-review")
        .expect("scoped config");
    assert_eq!(scoped.reviewer_pool, vec!["U3".to_owned()]);
}

#[tokio::test]
async fn unknown_verb_replies_with_hint() {
    let h = harness(jst(2024, 8, 27, 11, 0)).await;

    let reply = handle_command(&h.state, "C", "U0", "frobnicate").await;
    assert!(reply.starts_with("Unknown command `frobnicate`"), "{reply}");
    assert!(reply.contains("Usage"), "{reply}");
    assert!(h.state.configs().list_by_channel("C").await.expect("list").is_empty());
}

#[tokio::test]
async fn business_hours_can_be_set_and_cleared() {
    let h = harness(jst(2024, 8, 27, 11, 0)).await;

    let reply = handle_command(&h.state, "C", "U0", "set-business-hours-start 9:30").await;
    assert_eq!(reply, "Business hours start set to 09:30.");

    let reply = handle_command(&h.state, "C", "U0", "set-business-hours-start 25:00").await;
    assert!(reply.starts_with("Expected a time"), "{reply}");

    let reply = handle_command(&h.state, "C", "U0", "set-business-hours-start off").await;
    assert_eq!(reply, "Business hours start cleared.");
    let reply = handle_command(&h.state, "C", "U0", "show").await;
    assert!(reply.contains("*Business hours:* (always)"), "{reply}");
}

#[tokio::test]
async fn invalid_interval_and_timezone_are_rejected() {
    let h = harness(jst(2024, 8, 27, 11, 0)).await;

    let reply = handle_command(&h.state, "C", "U0", "set-reviewer-interval 0").await;
    assert!(reply.starts_with("Usage"), "{reply}");
    let reply = handle_command(&h.state, "C", "U0", "set-timezone Mars/Base").await;
    assert_eq!(reply, "Unknown timezone `Mars/Base`.");

    let reply = handle_command(&h.state, "C", "U0", "set-reviewer-interval 45").await;
    assert_eq!(reply, "Reminder interval set to 45 min.");
}

#[tokio::test]
async fn deactivate_excludes_config_from_fan_out() {
    let h = harness(jst(2024, 8, 27, 11, 0)).await;

    handle_command(&h.state, "C", "U0", "add-reviewer U1").await;
    handle_command(&h.state, "C", "U0", "deactivate").await;

    assert!(h.state.configs().list_all_active().await.expect("list").is_empty());
    let reply = handle_command(&h.state, "C", "U0", "show").await;
    assert!(reply.contains("*Active:* no"), "{reply}");
}
