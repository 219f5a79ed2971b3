//! Janitor pass: channel retirement and retention purge.

use chrono::Duration;

use review_herald::models::{PullRequestRef, ReviewTask, TaskStatus};
use review_herald::orchestrator::janitor::run_once;

use super::test_helpers::{harness, jst, seed_config, Harness};

async fn task_in(h: &Harness, channel: &str, number: i64, status: TaskStatus, age: Duration) -> ReviewTask {
    let pr = PullRequestRef {
        url: format!("https://github.com/o/r/pull/{number}"),
        repo: "o/r".into(),
        number,
        title: "t".into(),
    };
    let at = h.now() - age;
    let mut task = ReviewTask::new(&pr, channel.into(), format!("{number}.0"), "needs-review".into(), at);
    task.status = status;
    h.state.tasks().create(&task).await.expect("insert")
}

#[tokio::test]
async fn archived_channel_is_retired() {
    let h = harness(jst(2024, 8, 27, 11, 0)).await;
    let gone = seed_config(&h.state, "GONE", "needs-review", &["U1"], ("10:00", "19:00")).await;
    let live = seed_config(&h.state, "LIVE", "needs-review", &["U1"], ("10:00", "19:00")).await;
    let orphan = task_in(&h, "GONE", 1, TaskStatus::InReview, Duration::minutes(5)).await;
    let kept = task_in(&h, "LIVE", 2, TaskStatus::InReview, Duration::minutes(5)).await;
    h.chat.archive_channel("GONE");

    let report = run_once(&h.state).await.expect("janitor");
    assert_eq!(report.channels_retired, 1);
    assert_eq!(report.configs_deactivated, 1);
    assert_eq!(report.tasks_archived, 1);

    let configs = h.state.configs();
    assert!(!configs.get_by_id(&gone.id).await.expect("get").expect("row").active);
    assert!(configs.get_by_id(&live.id).await.expect("get").expect("row").active);

    let tasks = h.state.tasks();
    let orphan = tasks.get_by_id(&orphan.id).await.expect("get").expect("row");
    assert_eq!(orphan.status, TaskStatus::Archived);
    let kept = tasks.get_by_id(&kept.id).await.expect("get").expect("row");
    assert_eq!(kept.status, TaskStatus::InReview);
}

#[tokio::test]
async fn purge_respects_retention_windows() {
    let h = harness(jst(2024, 8, 27, 11, 0)).await;
    let old_done = task_in(&h, "C", 1, TaskStatus::Completed, Duration::hours(25)).await;
    let fresh_done = task_in(&h, "C", 2, TaskStatus::Completed, Duration::hours(23)).await;
    let old_archived = task_in(&h, "C", 3, TaskStatus::Archived, Duration::hours(48)).await;
    let old_snooze = task_in(&h, "C", 4, TaskStatus::Snoozed, Duration::days(15)).await;
    let recent_snooze = task_in(&h, "C", 5, TaskStatus::Snoozed, Duration::days(3)).await;
    let ancient_open = task_in(&h, "C", 6, TaskStatus::InReview, Duration::days(60)).await;

    let report = run_once(&h.state).await.expect("janitor");
    assert_eq!(report.tasks_purged, 3);

    let tasks = h.state.tasks();
    for gone in [&old_done, &old_archived, &old_snooze] {
        assert!(tasks.get_by_id(&gone.id).await.expect("get").is_none());
    }
    for kept in [&fresh_done, &recent_snooze, &ancient_open] {
        assert!(tasks.get_by_id(&kept.id).await.expect("get").is_some());
    }
}

#[tokio::test]
async fn nothing_to_do_is_an_empty_report() {
    let h = harness(jst(2024, 8, 27, 11, 0)).await;
    seed_config(&h.state, "C", "needs-review", &["U1"], ("10:00", "19:00")).await;

    let report = run_once(&h.state).await.expect("janitor");
    assert_eq!(report, Default::default());
}
