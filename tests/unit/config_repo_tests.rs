use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};

use review_herald::models::ChannelConfig;
use review_herald::persistence::config_repo::ConfigRepo;
use review_herald::persistence::db;
use review_herald::AppError;

async fn repo() -> ConfigRepo {
    let pool = db::connect_memory().await.expect("db");
    ConfigRepo::new(Arc::new(pool))
}

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 8, 27, 2, 0, 0).single().expect("time")
}

fn config(channel: &str, label: &str) -> ChannelConfig {
    ChannelConfig::new(channel.into(), label.into(), now())
}

#[tokio::test]
async fn upsert_round_trips_lists() {
    let repo = repo().await;
    let mut cfg = config("C", "needs-review");
    cfg.reviewer_pool = vec!["U1".into(), "U2".into()];
    cfg.repository_filter = vec!["o/r".into()];
    cfg.default_mention = "U9".into();
    repo.upsert(&cfg).await.expect("insert");

    let loaded = repo.get_by_id(&cfg.id).await.expect("get").expect("row");
    assert_eq!(loaded, cfg);
}

#[tokio::test]
async fn upsert_replaces_existing_row() {
    let repo = repo().await;
    let mut cfg = config("C", "needs-review");
    repo.upsert(&cfg).await.expect("insert");

    cfg.reminder_interval = 90;
    cfg.updated_at = now() + Duration::minutes(5);
    repo.upsert(&cfg).await.expect("update");

    let all = repo.list_by_channel("C").await.expect("list");
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].reminder_interval, 90);
    assert_eq!(all[0].created_at, now());
}

#[tokio::test]
async fn two_active_configs_with_same_label_are_rejected() {
    let repo = repo().await;
    repo.upsert(&config("C", "needs-review")).await.expect("first");

    let err = repo
        .upsert(&config("C", "needs-review"))
        .await
        .expect_err("duplicate active label");
    assert!(matches!(err, AppError::Db(_)));

    let mut inactive = config("C", "needs-review");
    inactive.active = false;
    repo.upsert(&inactive).await.expect("inactive duplicate is allowed");
}

#[tokio::test]
async fn label_lookup_prefers_active_row() {
    let repo = repo().await;
    let mut old = config("C", "needs-review");
    old.active = false;
    repo.upsert(&old).await.expect("inactive");
    let live = repo.upsert(&config("C", "needs-review")).await.expect("active");

    let found = repo
        .get_by_channel_and_label("C", "needs-review")
        .await
        .expect("get")
        .expect("row");
    assert_eq!(found.id, live.id);
    assert!(repo
        .get_by_channel_and_label("C", "other")
        .await
        .expect("get")
        .is_none());
}

#[tokio::test]
async fn deactivation_is_soft() {
    let repo = repo().await;
    let a = repo.upsert(&config("C", "needs-review")).await.expect("a");
    repo.upsert(&config("C", "project-a,needs-review")).await.expect("b");
    repo.upsert(&config("D", "needs-review")).await.expect("c");

    repo.deactivate(&a.id, now()).await.expect("deactivate");
    assert_eq!(repo.list_active_by_channel("C").await.expect("list").len(), 1);

    assert_eq!(repo.deactivate_channel("C", now()).await.expect("channel"), 1);
    assert!(repo.list_active_by_channel("C").await.expect("list").is_empty());
    assert_eq!(repo.list_by_channel("C").await.expect("list").len(), 2);
    assert_eq!(repo.list_all_active().await.expect("list").len(), 1);
}

#[tokio::test]
async fn primary_config_is_active_then_oldest() {
    let repo = repo().await;
    let mut first = config("C", "a");
    first.active = false;
    repo.upsert(&first).await.expect("first");
    let mut second = config("C", "b");
    second.created_at = now() + Duration::minutes(1);
    repo.upsert(&second).await.expect("second");

    let primary = repo.get_by_channel("C").await.expect("get").expect("row");
    assert_eq!(primary.id, second.id);
}
