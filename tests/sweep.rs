mod common;

use std::time::Duration;

use assert_matches::assert_matches;

use flavor_harvest::domain::IdRange;
use flavor_harvest::error::HarvestError;
use flavor_harvest::fetcher::RawResult;
use flavor_harvest::sweep::{SweepController, SweepOptions};

use common::{NoopSink, ScriptedFetcher, entity, html_body, json_body, temp_cache};

fn fast_options() -> SweepOptions {
    SweepOptions {
        throttle: Duration::ZERO,
        ..SweepOptions::default()
    }
}

#[test]
fn cached_ids_are_skipped_without_requests() {
    let (_temp, cache) = temp_cache();
    cache.put(1, &entity(1, "Apple", serde_json::json!([]))).unwrap();
    cache.put(3, &entity(3, "Pear", serde_json::json!([]))).unwrap();

    let fetcher = ScriptedFetcher::new(RawResult::HttpError(404))
        .with_entity(2, entity(2, "Plum", serde_json::json!([])));
    let controller = SweepController::new(&fetcher, &cache, fast_options());
    let report = controller
        .sweep(IdRange::new(1, 4).unwrap(), &NoopSink)
        .unwrap();

    assert_eq!(fetcher.calls(), vec![2, 4]);
    assert_eq!(report.skipped, 2);
    assert_eq!(report.downloaded, 1);
    assert_eq!(report.not_found, 1);
    assert!(report.errors.is_empty());
    assert!(cache.has(2));
}

#[test]
fn expected_failures_count_as_not_found() {
    let (_temp, cache) = temp_cache();
    let fetcher = ScriptedFetcher::new(RawResult::HttpError(404))
        .with(0, RawResult::HttpError(400))
        .with(1, RawResult::HttpError(500))
        .with(2, RawResult::TransportError("connection refused".to_string()))
        .with(3, html_body())
        .with(
            4,
            RawResult::Ok {
                body: b"{broken".to_vec(),
                content_type: None,
            },
        )
        .with(5, json_body(&serde_json::json!({"entity_id": 5})));
    let controller = SweepController::new(&fetcher, &cache, fast_options());
    let report = controller
        .sweep(IdRange::new(0, 6).unwrap(), &NoopSink)
        .unwrap();

    assert_eq!(report.not_found, 7);
    assert_eq!(report.downloaded, 0);
    assert!(report.errors.is_empty());
    assert!(cache.list().unwrap().is_empty());
}

#[test]
fn unexpected_statuses_are_recorded_but_do_not_stop() {
    let (_temp, cache) = temp_cache();
    let fetcher = ScriptedFetcher::new(RawResult::HttpError(404))
        .with(1, RawResult::HttpError(429))
        .with(2, RawResult::HttpError(503))
        .with_entity(3, entity(3, "Fig", serde_json::json!([])));
    let controller = SweepController::new(&fetcher, &cache, fast_options());
    let report = controller
        .sweep(IdRange::new(0, 3).unwrap(), &NoopSink)
        .unwrap();

    assert_eq!(report.errors.len(), 2);
    assert_eq!(report.errors[0].id, 1);
    assert_eq!(report.errors[0].message, "HTTP 429");
    assert_eq!(report.errors[1].message, "HTTP 503");
    assert_eq!(report.downloaded, 1);
    assert_eq!(report.aborted_at, None);
}

#[test]
fn every_error_is_counted_past_the_log_limit() {
    let (_temp, cache) = temp_cache();
    let fetcher = ScriptedFetcher::new(RawResult::HttpError(404))
        .with(2, RawResult::HttpError(429))
        .with(4, RawResult::HttpError(502))
        .with(6, RawResult::HttpError(503))
        .with(8, RawResult::HttpError(503));
    let options = SweepOptions {
        error_log_limit: 1,
        ..fast_options()
    };
    let controller = SweepController::new(&fetcher, &cache, options);
    let report = controller
        .sweep(IdRange::new(0, 9).unwrap(), &NoopSink)
        .unwrap();

    let ids: Vec<u32> = report.errors.iter().map(|error| error.id).collect();
    assert_eq!(ids, vec![2, 4, 6, 8]);
    assert_eq!(report.not_found, 6);
    assert_eq!(report.aborted_at, None);
}

#[test]
fn circuit_breaker_stops_sustained_errors() {
    let (_temp, cache) = temp_cache();
    let fetcher = ScriptedFetcher::new(RawResult::HttpError(503));
    let controller = SweepController::new(&fetcher, &cache, fast_options());
    let report = controller
        .sweep(IdRange::new(0, 1000).unwrap(), &NoopSink)
        .unwrap();

    assert!(report.errors.len() >= 20);
    assert_eq!(report.aborted_at, Some(19));
    assert_eq!(fetcher.calls().len(), 20);
}

#[test]
fn resumed_sweep_picks_up_after_abort() {
    let (_temp, cache) = temp_cache();
    let failing = ScriptedFetcher::new(RawResult::HttpError(503))
        .with_entity(0, entity(0, "Egg", serde_json::json!([])));
    let controller = SweepController::new(&failing, &cache, fast_options());
    let first = controller
        .sweep(IdRange::new(0, 50).unwrap(), &NoopSink)
        .unwrap();
    assert_eq!(first.downloaded, 1);
    assert!(first.aborted_at.is_some());

    let healthy = ScriptedFetcher::new(RawResult::HttpError(404));
    let controller = SweepController::new(&healthy, &cache, fast_options());
    let second = controller
        .sweep(IdRange::new(0, 50).unwrap(), &NoopSink)
        .unwrap();
    assert_eq!(second.skipped, 1);
    assert_eq!(healthy.calls().first(), Some(&1));
    assert_eq!(second.aborted_at, None);
}

#[test]
fn preflight_accepts_wrapped_entity() {
    let (_temp, cache) = temp_cache();
    let fetcher = ScriptedFetcher::new(RawResult::HttpError(404)).with(
        0,
        json_body(&serde_json::json!({"data": entity(0, "Egg", serde_json::json!([{"pubchem_id": 1}]))})),
    );
    let controller = SweepController::new(&fetcher, &cache, fast_options());
    let payload = controller.preflight(0).unwrap();

    assert_eq!(payload.entity_id, 0);
    assert_eq!(payload.name.as_deref(), Some("Egg"));
    assert_eq!(payload.molecules.len(), 1);
    assert!(!cache.has(0));
}

#[test]
fn failed_preflight_saves_response() {
    let (_temp, cache) = temp_cache();
    let fetcher = ScriptedFetcher::new(RawResult::HttpError(404))
        .with(0, json_body(&serde_json::json!({"status": "moved"})));
    let controller = SweepController::new(&fetcher, &cache, fast_options());
    let err = controller.preflight(0).unwrap_err();

    assert_matches!(
        &err,
        HarvestError::PreflightFailed { id: 0, diagnostic: Some(_), .. }
    );
    let saved = cache.root().join("TEST_RESPONSE.json");
    assert!(saved.as_std_path().exists());
    assert_eq!(fetcher.calls(), vec![0]);
    assert!(cache.list().unwrap().is_empty());
}

#[test]
fn unreachable_preflight_has_no_diagnostic() {
    let (_temp, cache) = temp_cache();
    let fetcher = ScriptedFetcher::new(RawResult::TransportError("dns failure".to_string()));
    let controller = SweepController::new(&fetcher, &cache, fast_options());
    let err = controller.preflight(0).unwrap_err();

    assert_matches!(err, HarvestError::PreflightFailed { diagnostic: None, .. });
}

#[test]
fn rejected_preflight_status_has_no_diagnostic() {
    let (_temp, cache) = temp_cache();
    let fetcher = ScriptedFetcher::new(RawResult::HttpError(404)).with(0, RawResult::HttpError(503));
    let controller = SweepController::new(&fetcher, &cache, fast_options());
    let err = controller.preflight(0).unwrap_err();

    assert_matches!(
        err,
        HarvestError::PreflightFailed { id: 0, ref reason, diagnostic: None } if reason == "HTTP 503"
    );
    assert_eq!(fetcher.calls(), vec![0]);
    assert!(!cache.root().as_std_path().exists());
}
