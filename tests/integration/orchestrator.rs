//! Full harvest cycles against a mocked upstream and a temporary data dir

use serde_json::Value;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use transit_harvester::config::HarvestConfig;
use transit_harvester::orchestrator::{HarvestSummary, Orchestrator, TickOutcome};
use transit_harvester::shutdown::ShutdownCoordinator;
use transit_harvester::snapshot::freshness::now_ms;
use transit_harvester::snapshot::{
    Dataset, Freshness, RouteCollections, RouteStopCollections, Snapshot, StopCollections,
};

use crate::support::{mock_endpoints, network, MockFetcher};

fn config(dir: &TempDir) -> HarvestConfig {
    HarvestConfig {
        data_dir: dir.path().to_path_buf(),
        endpoints: mock_endpoints(),
        concurrency: 4,
        ..HarvestConfig::default()
    }
}

fn orchestrator(dir: &TempDir, mock: MockFetcher) -> (Arc<MockFetcher>, Orchestrator) {
    let (mock, fetcher) = mock.shared();
    let orchestrator = Orchestrator::new(config(dir), fetcher, ShutdownCoordinator::shared());
    (mock, orchestrator)
}

fn read_json(dir: &TempDir, dataset: Dataset) -> Value {
    serde_json::from_slice(&fs::read(dir.path().join(dataset.file_name())).unwrap()).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn first_tick_writes_all_four_datasets() {
    let dir = TempDir::new().unwrap();
    let (mock, orchestrator) = orchestrator(&dir, network());

    let outcome = orchestrator.tick(false).await.unwrap();
    assert_eq!(
        outcome,
        TickOutcome::Refreshed(HarvestSummary {
            routes: 6,
            stops: 6,
            route_stops: 6,
            fares: 4,
        })
    );

    let routes = read_json(&dir, Dataset::Routes);
    assert_eq!(routes["kmb_routes"][0]["route"], "1A");
    assert_eq!(routes["kmb_routes"][0]["bound"], "O");
    assert_eq!(routes["minibus_routes"][1]["bound"], "2");
    assert_eq!(routes["minibus_routes"][1]["route_id"], "2004806");

    let stops = read_json(&dir, Dataset::Stops);
    assert_eq!(stops["ctb_stops"]["001"]["name_en"], "Central (Exchange Square)");
    assert_eq!(stops["kmb_stops"]["K2"]["lat"], "22.345");
    assert_eq!(stops["minibus_stops"]["20003337"]["lat"], 22.3122);

    let route_stops = read_json(&dir, Dataset::RouteStops);
    assert_eq!(route_stops["ctb_route_stops"]["2-O"][0]["stop_id"], "003");

    let fares = read_json(&dir, Dataset::Fares);
    assert_eq!(fares["kmb_routes"].as_array().unwrap().len(), 2);

    // One timestamp shared by the whole run
    let stamps: Vec<_> = Dataset::ALL
        .iter()
        .map(|&dataset| read_json(&dir, dataset)["timestamp"].as_i64().unwrap())
        .collect();
    assert!(stamps.windows(2).all(|pair| pair[0] == pair[1]));

    // Every upstream URL, route-stop listings included, is fetched once per run
    assert!(mock.repeated_urls().is_empty(), "{:?}", mock.repeated_urls());
    assert_eq!(mock.calls("http://mock/ctb/route-stop/CTB/1/outbound"), 1);
    assert_eq!(mock.calls("http://mock/gmb/route-stop/2004806/1"), 1);
}

#[tokio::test]
async fn fresh_datasets_skip_the_run() {
    let dir = TempDir::new().unwrap();
    let (mock, orchestrator) = orchestrator(&dir, network());

    orchestrator.tick(false).await.unwrap();
    let calls_after_first = mock.calls_with_prefix("http://mock/");
    let before = fs::read(dir.path().join(Dataset::Routes.file_name())).unwrap();

    assert_eq!(orchestrator.tick(false).await.unwrap(), TickOutcome::Skipped);
    assert_eq!(mock.calls_with_prefix("http://mock/"), calls_after_first);
    assert_eq!(fs::read(dir.path().join(Dataset::Routes.file_name())).unwrap(), before);

    // A day later every dataset is stale again
    let window = orchestrator.config().freshness_window;
    let later = now_ms() + window.as_millis() as i64 + 1_000;
    assert!(orchestrator
        .check_at(later)
        .iter()
        .all(|(_, freshness)| matches!(freshness, Freshness::Stale { .. })));
}

#[tokio::test]
async fn one_stale_dataset_refreshes_all_four() {
    let dir = TempDir::new().unwrap();
    let store_timestamp = now_ms();
    let (_, orchestrator) = orchestrator(&dir, network());
    let store = orchestrator.store();

    // Three fresh files from an earlier run, routes two days old
    let two_days = Duration::from_secs(2 * 86_400).as_millis() as i64;
    store
        .write(Dataset::Routes, &Snapshot::new(RouteCollections::default(), store_timestamp - two_days))
        .unwrap();
    store
        .write(Dataset::Stops, &Snapshot::new(StopCollections::default(), store_timestamp))
        .unwrap();
    store
        .write(Dataset::RouteStops, &Snapshot::new(RouteStopCollections::default(), store_timestamp))
        .unwrap();
    fs::write(store.path_for(Dataset::Fares), "{\"timestamp\": 1}").unwrap();

    assert!(matches!(orchestrator.tick(false).await.unwrap(), TickOutcome::Refreshed(_)));
    for (dataset, freshness) in orchestrator.check() {
        assert!(freshness.is_fresh(), "{dataset} is {freshness}");
    }
    let stops: Snapshot<StopCollections> = store.read(Dataset::Stops).unwrap().unwrap();
    assert_eq!(stops.data.ctb_stops.len(), 2);
}

#[tokio::test]
async fn force_reruns_even_when_fresh() {
    let dir = TempDir::new().unwrap();
    let (mock, orchestrator) = orchestrator(&dir, network());

    orchestrator.tick(false).await.unwrap();
    assert!(matches!(orchestrator.tick(true).await.unwrap(), TickOutcome::Refreshed(_)));
    assert_eq!(mock.calls("http://mock/kmb/route/"), 2);
}

#[tokio::test]
async fn upstream_outage_still_writes_well_formed_empty_datasets() {
    let dir = TempDir::new().unwrap();
    let (_, orchestrator) = orchestrator(&dir, MockFetcher::new());

    let outcome = orchestrator.tick(false).await.unwrap();
    assert_eq!(outcome, TickOutcome::Refreshed(HarvestSummary::default()));

    let routes = read_json(&dir, Dataset::Routes);
    assert_eq!(routes["kmb_routes"], serde_json::json!([]));
    assert_eq!(routes["ctb_routes"], serde_json::json!([]));
    assert_eq!(routes["minibus_routes"], serde_json::json!([]));
    assert!(routes["timestamp"].is_i64());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_harvesters_leave_valid_files() {
    let dir = TempDir::new().unwrap();
    let (_, first) = orchestrator(&dir, network());
    let (_, second) = orchestrator(&dir, network());

    let (a, b) = tokio::join!(first.tick(true), second.tick(true));
    assert!(a.is_ok() && b.is_ok());

    for dataset in Dataset::ALL {
        let json = read_json(&dir, dataset);
        assert!(json["timestamp"].is_i64(), "{dataset}");
    }
    let leftovers: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| !name.ends_with(".json") && name != ".harvest.lock")
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
}
