//! Submitted reviews closing tasks under the latest-task-per-channel policy.

use chrono::Duration;

use review_herald::errors::ChatErrorKind;
use review_herald::github::{handle_delivery, WebhookEvent};
use review_herald::models::{PullRequestRef, ReviewTask, TaskStatus};

use super::test_helpers::{harness, jst, review_event, ChatCall, Harness};

fn pr(number: i64) -> PullRequestRef {
    PullRequestRef {
        url: format!("https://github.com/o/r/pull/{number}"),
        repo: "o/r".into(),
        number,
        title: format!("PR {number}"),
    }
}

async fn insert(h: &Harness, channel: &str, ts: &str, number: i64, age: Duration) -> ReviewTask {
    let mut task = ReviewTask::new(
        &pr(number),
        channel.into(),
        ts.into(),
        "needs-review".into(),
        h.now() - age,
    );
    task.status = TaskStatus::InReview;
    task.reviewer = "U1".into();
    h.state.tasks().create(&task).await.expect("insert task")
}

/// Rows written before the active-task index existed can hold duplicates.
async fn drop_active_index(h: &Harness) {
    sqlx::query("DROP INDEX idx_review_task_active_pr")
        .execute(h.state.db.as_ref())
        .await
        .expect("drop index");
}

fn approved(number: i64) -> WebhookEvent {
    WebhookEvent::Review(Box::new(review_event("APPROVED", "octo", Some("Octo Cat"), "o/r", number)))
}

// ── S6: two stale tasks in one channel ──────────────────────

#[tokio::test]
async fn review_notifies_latest_task_and_completes_all() {
    let h = harness(jst(2024, 8, 27, 15, 0)).await;
    drop_active_index(&h).await;
    let older = insert(&h, "C", "100.000001", 42, Duration::hours(2)).await;
    let newer = insert(&h, "C", "100.000002", 42, Duration::hours(1)).await;

    handle_delivery(&h.state, approved(42)).await.expect("delivery");

    for id in [&older.id, &newer.id] {
        let task = h.state.tasks().get_by_id(id).await.expect("get").expect("row");
        assert_eq!(task.status, TaskStatus::Completed);
    }

    let notes = h.chat.thread_notes();
    assert_eq!(notes.len(), 1);
    let ChatCall::Thread { thread_ts, body, .. } = &notes[0] else {
        unreachable!()
    };
    assert_eq!(thread_ts, "100.000002");
    assert!(body.contains("Octo Cat"));
    assert!(body.contains("approved"));
}

#[tokio::test]
async fn each_channel_gets_its_own_note() {
    let h = harness(jst(2024, 8, 27, 15, 0)).await;
    insert(&h, "C1", "1.1", 5, Duration::hours(1)).await;
    insert(&h, "C2", "2.1", 5, Duration::hours(1)).await;

    handle_delivery(&h.state, approved(5)).await.expect("delivery");

    let mut channels: Vec<String> = h
        .chat
        .thread_notes()
        .into_iter()
        .filter_map(|c| match c {
            ChatCall::Thread { channel, .. } => Some(channel),
            _ => None,
        })
        .collect();
    channels.sort();
    assert_eq!(channels, vec!["C1", "C2"]);
}

#[tokio::test]
async fn second_review_does_not_renotify() {
    let h = harness(jst(2024, 8, 27, 15, 0)).await;
    insert(&h, "C", "1.1", 6, Duration::hours(1)).await;

    handle_delivery(&h.state, approved(6)).await.expect("first");
    h.chat.clear();
    handle_delivery(&h.state, approved(6)).await.expect("second");

    assert!(h.chat.calls().is_empty());
}

#[tokio::test]
async fn display_name_falls_back_to_login() {
    let h = harness(jst(2024, 8, 27, 15, 0)).await;
    insert(&h, "C", "1.1", 7, Duration::hours(1)).await;

    let event = review_event("commented", "octo", None, "o/r", 7);
    handle_delivery(&h.state, WebhookEvent::Review(Box::new(event)))
        .await
        .expect("delivery");

    let notes = h.chat.thread_notes();
    let ChatCall::Thread { body, .. } = &notes[0] else {
        unreachable!()
    };
    assert!(body.contains("octo"));
}

#[tokio::test]
async fn dismissed_review_leaves_tasks_open() {
    let h = harness(jst(2024, 8, 27, 15, 0)).await;
    let task = insert(&h, "C", "1.1", 8, Duration::hours(1)).await;

    let event = review_event("dismissed", "octo", None, "o/r", 8);
    handle_delivery(&h.state, WebhookEvent::Review(Box::new(event)))
        .await
        .expect("delivery");

    let task = h.state.tasks().get_by_id(&task.id).await.expect("get").expect("row");
    assert_eq!(task.status, TaskStatus::InReview);
    assert!(h.chat.calls().is_empty());
}

// ── Chat failures ───────────────────────────────────────────

#[tokio::test]
async fn channel_loss_still_completes_the_group() {
    let h = harness(jst(2024, 8, 27, 15, 0)).await;
    let task = insert(&h, "C", "1.1", 9, Duration::hours(1)).await;
    h.chat.fail_channel("C", ChatErrorKind::ChannelRelated);

    handle_delivery(&h.state, approved(9)).await.expect("delivery");

    let task = h.state.tasks().get_by_id(&task.id).await.expect("get").expect("row");
    assert_eq!(task.status, TaskStatus::Completed);
}

#[tokio::test]
async fn transient_failure_skips_the_group() {
    let h = harness(jst(2024, 8, 27, 15, 0)).await;
    let task = insert(&h, "C", "1.1", 10, Duration::hours(1)).await;
    h.chat.fail_channel("C", ChatErrorKind::Transient);

    handle_delivery(&h.state, approved(10)).await.expect("delivery");

    let task = h.state.tasks().get_by_id(&task.id).await.expect("get").expect("row");
    assert_eq!(task.status, TaskStatus::InReview);
}
