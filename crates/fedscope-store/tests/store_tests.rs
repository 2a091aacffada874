use std::collections::BTreeMap;

use fedscope_protocol::{MetricSample, RawMetricsByRole, Role, SeriesKey};
use fedscope_store::{group_by_role, ExperimentContent, ExperimentStore, SampleDisposition};

fn sample(role: Role, device: &str, round: u64, exp_id: &str) -> MetricSample {
    MetricSample {
        round,
        accuracy: 0.30 + round as f64 * 0.05,
        loss: 0.70 - round as f64 * 0.05,
        device: device.to_string(),
        role,
        exp_id: exp_id.to_string(),
    }
}

fn raw_metrics(exp_id: &str, series: &[(Role, &str, u64)]) -> RawMetricsByRole {
    let mut raw = RawMetricsByRole::new();
    for (role, device, rounds) in series {
        let samples = (0..*rounds).map(|r| sample(*role, device, r, exp_id)).collect();
        raw.entry(*role)
            .or_insert_with(BTreeMap::new)
            .insert(device.to_string(), samples);
    }
    raw
}

fn loaded_store(exp_id: &str, series: &[(Role, &str, u64)]) -> ExperimentStore {
    let mut store = ExperimentStore::new();
    store.load_snapshot(
        exp_id,
        raw_metrics(exp_id, series),
        BTreeMap::new(),
        BTreeMap::new(),
        BTreeMap::new(),
    );
    store
}

#[test]
fn test_flatten_one_series_per_role_device_pair() {
    let store = loaded_store(
        "exp",
        &[
            (Role::Client, "Client-0", 3),
            (Role::Client, "Client-1", 2),
            (Role::Edge, "Edge-0", 3),
            (Role::Central, "Central", 1),
        ],
    );

    let content = store.experiment("exp").unwrap();
    assert_eq!(content.metrics.len(), 4);
    for key in ["client-Client-0", "client-Client-1", "edge-Edge-0", "central-Central"] {
        assert!(content.metrics.contains_key(&SeriesKey::from_raw(key)), "missing {key}");
    }
    assert_eq!(content.metrics[&SeriesKey::from_raw("client-Client-1")].len(), 2);
}

#[test]
fn test_flatten_preserves_order_and_content() {
    let store = loaded_store("exp", &[(Role::Edge, "Edge-0", 4)]);
    let content = store.experiment("exp").unwrap();
    let series = &content.metrics[&SeriesKey::new(Role::Edge, "Edge-0")];
    let rounds: Vec<u64> = series.iter().map(|s| s.round).collect();
    assert_eq!(rounds, [0, 1, 2, 3]);
    assert_eq!(series[2], sample(Role::Edge, "Edge-0", 2, "exp"));
}

#[test]
fn test_append_only_extends_target_series() {
    let mut store = loaded_store(
        "exp",
        &[(Role::Client, "Client-0", 2), (Role::Client, "Client-1", 2)],
    );
    let before = store.experiment("exp").unwrap().clone();

    let disposition = store.apply_streamed_sample(sample(Role::Client, "Client-0", 2, "exp"));
    assert_eq!(disposition, SampleDisposition::Applied);

    let after = store.experiment("exp").unwrap();
    let key = SeriesKey::new(Role::Client, "Client-0");
    assert_eq!(after.metrics[&key].len(), 3);
    assert_eq!(after.metrics[&key][..2], before.metrics[&key][..]);
    assert_eq!(after.metrics[&key][2].round, 2);
    // No other series is touched.
    let other = SeriesKey::new(Role::Client, "Client-1");
    assert_eq!(after.metrics[&other], before.metrics[&other]);
}

#[test]
fn test_append_creates_series_for_new_device() {
    let mut store = loaded_store("exp", &[(Role::Client, "Client-0", 1)]);
    store.apply_streamed_sample(sample(Role::Edge, "Edge-9", 0, "exp"));

    let content = store.experiment("exp").unwrap();
    assert_eq!(content.metrics[&SeriesKey::from_raw("edge-Edge-9")].len(), 1);
}

#[test]
fn test_unknown_experiment_drop_leaves_store_unchanged() {
    let mut store = loaded_store("exp", &[(Role::Client, "Client-0", 2)]);
    let before = store.experiment("exp").unwrap().clone();

    let disposition = store.apply_streamed_sample(sample(Role::Client, "Client-0", 9, "ghost"));
    assert_eq!(disposition, SampleDisposition::DroppedUnknownExperiment);
    assert_eq!(store.len(), 1);
    assert_eq!(**store.experiment("exp").unwrap(), *before);
    assert_eq!(store.dropped_unknown(), 1);
}

#[test]
fn test_reload_replaces_content_wholesale() {
    let series = [(Role::Client, "Client-0", 2)];
    let mut store = loaded_store("exp", &series);
    store.apply_streamed_sample(sample(Role::Client, "Client-0", 2, "exp"));
    assert_eq!(
        store.experiment("exp").unwrap().metrics[&SeriesKey::from_raw("client-Client-0")].len(),
        3
    );

    store.load_snapshot(
        "exp",
        raw_metrics("exp", &series),
        BTreeMap::new(),
        BTreeMap::new(),
        BTreeMap::new(),
    );
    assert_eq!(
        store.experiment("exp").unwrap().metrics[&SeriesKey::from_raw("client-Client-0")].len(),
        2
    );
}

#[test]
fn test_idempotent_reload_is_byte_equal() {
    let series = [
        (Role::Client, "Client-0", 3),
        (Role::Edge, "Edge-0", 3),
        (Role::Central, "Central", 3),
    ];
    let mut store = loaded_store("exp", &series);
    let first = serde_json::to_string(&**store.experiment("exp").unwrap()).unwrap();

    store.load_snapshot(
        "exp",
        raw_metrics("exp", &series),
        BTreeMap::new(),
        BTreeMap::new(),
        BTreeMap::new(),
    );
    let second = serde_json::to_string(&**store.experiment("exp").unwrap()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_snapshot_is_frozen_against_later_appends() {
    let mut store = loaded_store("exp", &[(Role::Central, "Central", 1)]);
    let snapshot = store.snapshot();

    store.apply_streamed_sample(sample(Role::Central, "Central", 1, "exp"));

    let key = SeriesKey::new(Role::Central, "Central");
    assert_eq!(snapshot.experiment("exp").unwrap().metrics[&key].len(), 1);
    assert_eq!(store.experiment("exp").unwrap().metrics[&key].len(), 2);
}

#[test]
fn test_grouping_partitions_are_complete_and_disjoint() {
    let store = loaded_store(
        "exp",
        &[
            (Role::Client, "Client-0", 1),
            (Role::Client, "Client-1", 1),
            (Role::Edge, "Edge-0", 1),
            (Role::Central, "Central", 1),
        ],
    );
    let mut content = (**store.experiment("exp").unwrap()).clone();
    // A key outside the three known prefixes belongs to no partition.
    content.metrics.insert(SeriesKey::from_raw("probe-x"), Vec::new());

    let groups = group_by_role(&content);
    assert_eq!(groups.clients.len(), 2);
    assert_eq!(groups.edge.len(), 1);
    assert_eq!(groups.central.len(), 1);
    assert_eq!(groups.len() + 1, content.metrics.len());

    for (key, _) in &groups.clients {
        assert!(key.as_str().starts_with("client-"));
    }
    for (key, _) in &groups.edge {
        assert!(key.as_str().starts_with("edge-"));
    }
    for (key, _) in &groups.central {
        assert!(key.as_str().starts_with("central-"));
    }
}

#[test]
fn test_grouping_empty_content() {
    let content = ExperimentContent::default();
    let groups = group_by_role(&content);
    assert!(groups.is_empty());
}

#[test]
fn test_latest_round_spans_all_series() {
    let store = loaded_store(
        "exp",
        &[(Role::Client, "Client-0", 5), (Role::Edge, "Edge-0", 2)],
    );
    assert_eq!(store.experiment("exp").unwrap().latest_round(), Some(4));
    assert_eq!(ExperimentContent::default().latest_round(), None);
}
