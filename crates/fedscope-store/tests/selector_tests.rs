use std::collections::BTreeMap;

use fedscope_protocol::{DistributionMap, LoaderDistribution};
use fedscope_store::{DistributionSelector, Selection};

fn entry(num_items: u64) -> LoaderDistribution {
    LoaderDistribution {
        label_distribution: BTreeMap::from([("0".to_string(), num_items)]),
        num_items,
    }
}

fn distributions() -> DistributionMap {
    BTreeMap::from([
        (
            "c1".to_string(),
            BTreeMap::from([
                ("train".to_string(), entry(1200)),
                ("val".to_string(), entry(300)),
            ]),
        ),
        ("c2".to_string(), BTreeMap::new()),
    ])
}

#[test]
fn test_nothing_selected() {
    let selector = DistributionSelector::new();
    assert_eq!(selector.current(&distributions()), Selection::None);
}

#[test]
fn test_select_client_resets_to_first_loader() {
    let map = distributions();
    let mut selector = DistributionSelector::new();
    selector.select_client(&map, "c1");
    assert_eq!(selector.loader(), Some("train"));
    assert!(matches!(selector.current(&map), Selection::Entry(e) if e.num_items == 1200));
}

#[test]
fn test_reselect_overrides_previous_loader_choice() {
    let map = distributions();
    let mut selector = DistributionSelector::new();
    selector.select_client(&map, "c1");
    selector.select_loader("val");
    assert!(matches!(selector.current(&map), Selection::Entry(e) if e.num_items == 300));

    selector.select_client(&map, "c1");
    assert_eq!(selector.loader(), Some("train"));
}

#[test]
fn test_select_client_with_empty_loader_map() {
    let map = distributions();
    let mut selector = DistributionSelector::new();
    selector.select_client(&map, "c2");
    assert_eq!(selector.client(), Some("c2"));
    assert_eq!(selector.loader(), None);
    assert_eq!(selector.current(&map), Selection::None);
}

#[test]
fn test_select_unknown_client() {
    let map = distributions();
    let mut selector = DistributionSelector::new();
    selector.select_client(&map, "ghost");
    assert_eq!(selector.loader(), None);
    assert_eq!(selector.current(&map), Selection::None);
}

#[test]
fn test_absent_pair_is_missing_not_error() {
    let map = distributions();
    let mut selector = DistributionSelector::new();
    selector.select_client(&map, "c1");
    selector.select_loader("testloader");
    assert_eq!(selector.current(&map), Selection::Missing);
}

#[test]
fn test_selection_survives_map_shrinking() {
    let mut map = distributions();
    let mut selector = DistributionSelector::new();
    selector.select_client(&map, "c1");
    map.remove("c1");
    assert_eq!(selector.current(&map), Selection::Missing);
}

#[test]
fn test_loader_ids_in_map_order() {
    let map = distributions();
    let mut selector = DistributionSelector::new();
    selector.select_client(&map, "c1");
    assert_eq!(selector.loader_ids(&map), ["train", "val"]);

    selector.select_client(&map, "c2");
    assert!(selector.loader_ids(&map).is_empty());
}
