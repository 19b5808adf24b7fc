//! Cache freshness classification at the window boundary

use std::fs;
use std::time::Duration;
use tempfile::TempDir;
use transit_harvester::snapshot::{classify, Dataset, Freshness};

const WINDOW_SECS: u64 = 86_400;
const NOW_MS: i64 = 1_717_171_717_000;

fn snapshot_with_age(dir: &TempDir, age: Duration) -> std::path::PathBuf {
    let path = dir.path().join(Dataset::Routes.file_name());
    let timestamp = NOW_MS - age.as_millis() as i64;
    fs::write(
        &path,
        format!(r#"{{"kmb_routes": [], "ctb_routes": [], "minibus_routes": [], "timestamp": {timestamp}}}"#),
    )
    .unwrap();
    path
}

#[test]
fn one_second_past_the_window_is_stale() {
    let dir = TempDir::new().unwrap();
    let path = snapshot_with_age(&dir, Duration::from_secs(WINDOW_SECS + 1));
    let state = classify(&path, Duration::from_secs(WINDOW_SECS), NOW_MS);
    assert!(matches!(state, Freshness::Stale { age_ms: Some(_) }));
}

#[test]
fn one_second_inside_the_window_is_fresh() {
    let dir = TempDir::new().unwrap();
    let path = snapshot_with_age(&dir, Duration::from_secs(WINDOW_SECS - 1));
    let state = classify(&path, Duration::from_secs(WINDOW_SECS), NOW_MS);
    assert!(state.is_fresh());
    assert_eq!(state.age(), Some(Duration::from_secs(WINDOW_SECS - 1)));
}

#[test]
fn exactly_the_window_is_stale() {
    let dir = TempDir::new().unwrap();
    let path = snapshot_with_age(&dir, Duration::from_secs(WINDOW_SECS));
    assert!(!classify(&path, Duration::from_secs(WINDOW_SECS), NOW_MS).is_fresh());
}

#[test]
fn timestamp_from_the_future_is_stale() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(Dataset::Routes.file_name());
    fs::write(&path, format!(r#"{{"timestamp": {}}}"#, NOW_MS + 60_000)).unwrap();

    let state = classify(&path, Duration::from_secs(WINDOW_SECS), NOW_MS);
    assert_eq!(state, Freshness::Stale { age_ms: Some(-60_000) });
    assert_eq!(state.age(), None);
}

#[test]
fn missing_file_is_missing_and_not_fresh() {
    let dir = TempDir::new().unwrap();
    let state = classify(
        &dir.path().join(Dataset::Stops.file_name()),
        Duration::from_secs(WINDOW_SECS),
        NOW_MS,
    );
    assert_eq!(state, Freshness::Missing);
    assert!(!state.is_fresh());
}

#[test]
fn unparseable_file_is_stale() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(Dataset::Fares.file_name());

    fs::write(&path, b"\x00\x01 not json").unwrap();
    assert_eq!(
        classify(&path, Duration::from_secs(WINDOW_SECS), NOW_MS),
        Freshness::Stale { age_ms: None }
    );

    fs::write(&path, r#"{"kmb_routes": []}"#).unwrap();
    assert_eq!(
        classify(&path, Duration::from_secs(WINDOW_SECS), NOW_MS),
        Freshness::Stale { age_ms: None }
    );
}
