use std::collections::BTreeMap;

use fedscope_protocol::{MetricSample, RawMetricsByRole, Role, SeriesKey};
use fedscope_store::StoreService;

fn sample(device: &str, round: u64, exp_id: &str) -> MetricSample {
    MetricSample {
        round,
        accuracy: 0.5,
        loss: 0.5,
        device: device.to_string(),
        role: Role::Client,
        exp_id: exp_id.to_string(),
    }
}

fn one_series(exp_id: &str, device: &str) -> RawMetricsByRole {
    let mut raw = RawMetricsByRole::new();
    raw.entry(Role::Client)
        .or_insert_with(BTreeMap::new)
        .insert(device.to_string(), vec![sample(device, 0, exp_id)]);
    raw
}

#[tokio::test]
async fn test_commit_is_visible_after_ack() {
    let (service, handle) = StoreService::new();
    tokio::spawn(service.run());

    handle
        .load_snapshot(
            "exp",
            one_series("exp", "Client-0"),
            BTreeMap::new(),
            BTreeMap::new(),
            BTreeMap::new(),
        )
        .await
        .unwrap();

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.len(), 1);
    let content = snapshot.experiment("exp").unwrap();
    assert_eq!(content.metrics[&SeriesKey::from_raw("client-Client-0")].len(), 1);
}

#[tokio::test]
async fn test_ingest_preserves_arrival_order() {
    let (service, handle) = StoreService::new();
    tokio::spawn(service.run());

    handle
        .load_snapshot(
            "exp",
            RawMetricsByRole::new(),
            BTreeMap::new(),
            BTreeMap::new(),
            BTreeMap::new(),
        )
        .await
        .unwrap();

    handle.ingest(sample("Client-0", 0, "exp")).await.unwrap();
    handle.ingest(sample("Client-0", 1, "exp")).await.unwrap();
    // An acked commit behind the samples guarantees both were drained.
    handle
        .load_snapshot(
            "other",
            RawMetricsByRole::new(),
            BTreeMap::new(),
            BTreeMap::new(),
            BTreeMap::new(),
        )
        .await
        .unwrap();

    let snapshot = handle.snapshot();
    let series = &snapshot.experiment("exp").unwrap().metrics[&SeriesKey::from_raw("client-Client-0")];
    let rounds: Vec<u64> = series.iter().map(|s| s.round).collect();
    assert_eq!(rounds, [0, 1]);
}

#[tokio::test]
async fn test_unknown_sample_counted_without_content_change() {
    let (service, handle) = StoreService::new();
    tokio::spawn(service.run());

    handle.ingest(sample("Client-0", 0, "ghost")).await.unwrap();
    handle
        .load_snapshot(
            "exp",
            RawMetricsByRole::new(),
            BTreeMap::new(),
            BTreeMap::new(),
            BTreeMap::new(),
        )
        .await
        .unwrap();

    let snapshot = handle.snapshot();
    assert!(snapshot.experiment("ghost").is_none());
    assert_eq!(snapshot.dropped_unknown(), 1);
}

#[tokio::test]
async fn test_subscriber_wakes_on_each_observed_mutation() {
    let (service, handle) = StoreService::new();
    tokio::spawn(service.run());
    let mut watcher = handle.subscribe();

    handle
        .load_snapshot(
            "exp",
            one_series("exp", "Client-0"),
            BTreeMap::new(),
            BTreeMap::new(),
            BTreeMap::new(),
        )
        .await
        .unwrap();
    watcher.changed().await.unwrap();
    assert_eq!(watcher.borrow_and_update().len(), 1);

    handle.ingest(sample("Client-0", 1, "exp")).await.unwrap();
    watcher.changed().await.unwrap();
    let series_len = watcher
        .borrow_and_update()
        .experiment("exp")
        .unwrap()
        .metrics[&SeriesKey::from_raw("client-Client-0")]
        .len();
    assert_eq!(series_len, 2);
}

#[tokio::test]
async fn test_earlier_snapshot_not_mutated_by_later_append() {
    let (service, handle) = StoreService::new();
    tokio::spawn(service.run());

    handle
        .load_snapshot(
            "exp",
            one_series("exp", "Client-0"),
            BTreeMap::new(),
            BTreeMap::new(),
            BTreeMap::new(),
        )
        .await
        .unwrap();
    let earlier = handle.snapshot();
    let mut watcher = handle.subscribe();
    watcher.borrow_and_update();

    handle.ingest(sample("Client-0", 1, "exp")).await.unwrap();
    watcher.changed().await.unwrap();

    let key = SeriesKey::from_raw("client-Client-0");
    assert_eq!(earlier.experiment("exp").unwrap().metrics[&key].len(), 1);
    assert_eq!(
        watcher.borrow().experiment("exp").unwrap().metrics[&key].len(),
        2
    );
}
