use std::fs;
use std::time::Duration;

use assert_matches::assert_matches;

use flavor_harvest::config::{
    Config, ConfigLoader, DEFAULT_API_BASE, FlavorDbEntry, default_graph_extensions,
};
use flavor_harvest::error::HarvestError;

#[test]
fn defaults_fill_every_field() {
    let resolved = ConfigLoader::resolve_config(Config::default()).unwrap();
    assert_eq!(resolved.raw_root.as_str(), "data/raw");
    assert_eq!(resolved.flavordb.api_base, DEFAULT_API_BASE);
    assert_eq!(resolved.flavordb.range.start(), 0);
    assert_eq!(resolved.flavordb.range.end(), 1000);
    assert_eq!(resolved.flavordb.preflight_id, 0);
    assert_eq!(resolved.flavordb.timeout, Duration::from_secs(15));
    assert_eq!(resolved.flavordb.throttle, Duration::from_millis(150));
    assert_eq!(resolved.flavordb.error_log_limit, 3);
    assert_eq!(resolved.flavordb.breaker_window, 20);
    assert_eq!(resolved.flavordb.breaker_max_span, Some(25));
    assert_eq!(resolved.flavorgraph.branch, "master");
    assert_eq!(resolved.flavorgraph.extensions, default_graph_extensions());
}

#[test]
fn file_values_override_defaults() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("flavor-harvest.json");
    fs::write(
        &path,
        r#"{
            "raw_root": "/srv/raw",
            "flavordb": {"api_base": "http://localhost:8080/", "max_entity_id": 25, "throttle_ms": 0},
            "flavorgraph": {"branch": "main", "extensions": ["csv"]}
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(Some(path.to_str().unwrap())).unwrap();
    assert_eq!(resolved.raw_root.as_str(), "/srv/raw");
    assert_eq!(resolved.flavordb.api_base, "http://localhost:8080");
    assert_eq!(resolved.flavordb.range.end(), 25);
    assert!(resolved.flavordb.throttle.is_zero());
    assert_eq!(resolved.flavorgraph.branch, "main");
    assert_eq!(resolved.flavorgraph.extensions, vec!["csv".to_string()]);
}

#[test]
fn explicit_missing_path_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");
    let err = ConfigLoader::resolve(Some(path.to_str().unwrap())).unwrap_err();
    assert_matches!(err, HarvestError::ConfigRead(_));
}

#[test]
fn malformed_file_is_a_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("broken.json");
    fs::write(&path, "{ raw_root: ").unwrap();
    let err = ConfigLoader::resolve(Some(path.to_str().unwrap())).unwrap_err();
    assert_matches!(err, HarvestError::ConfigParse(_));
}

#[test]
fn inverted_range_is_rejected() {
    let config = Config {
        flavordb: FlavorDbEntry {
            min_entity_id: Some(10),
            max_entity_id: Some(5),
            ..FlavorDbEntry::default()
        },
        ..Config::default()
    };
    let err = ConfigLoader::resolve_config(config).unwrap_err();
    assert_matches!(err, HarvestError::InvalidRange(_));
}
