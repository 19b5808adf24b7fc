//! Route-driven stop discovery with one detail request per distinct stop

use serde_json::json;
use transit_harvester::normalize::harvest_routes;
use transit_harvester::pool::WorkerPool;
use transit_harvester::sequence::fetch_listings;
use transit_harvester::snapshot::RouteCollections;
use transit_harvester::stops::resolve_stops;
use transit_harvester::{Bound, Coordinate, Provider, Route};

use crate::support::{mock_endpoints, network, MockFetcher, MOCK_BASE};

#[tokio::test]
async fn resolves_stops_for_every_provider() {
    let (mock, fetcher) = network().shared();
    let endpoints = mock_endpoints();
    let pool = WorkerPool::new(3);

    let routes = harvest_routes(&fetcher, &endpoints, &pool).await;
    let listings = fetch_listings(&fetcher, &endpoints, &pool, &routes).await;
    let stops = resolve_stops(&fetcher, &endpoints, &pool, &listings).await;

    let kmb: Vec<_> = stops.kmb_stops.keys().map(String::as_str).collect();
    assert_eq!(kmb, vec!["K1", "K2"]);
    assert_eq!(stops.kmb_stops["K1"].latitude, Coordinate::Text("22.293".to_string()));

    // 003 has no coordinates and is omitted
    let ctb: Vec<_> = stops.ctb_stops.keys().map(String::as_str).collect();
    assert_eq!(ctb, vec!["001", "002"]);
    assert_eq!(stops.ctb_stops["002"].name, "金鐘");

    // Name hints come from the first listing that carries one
    assert_eq!(stops.minibus_stops["20003337"].name, "Kwun Tong");
    assert_eq!(stops.minibus_stops["20003338"].name, "Tsui Ping");
    assert_eq!(stops.minibus_stops["20003338"].longitude, Coordinate::Number(114.2339));

    // 002 is listed by three route directions, yet fetched once
    assert_eq!(mock.calls(&format!("{MOCK_BASE}/ctb/stop/002")), 1);
    assert_eq!(mock.calls_with_prefix(&format!("{MOCK_BASE}/ctb/stop/")), 3);
    assert_eq!(mock.calls_with_prefix(&format!("{MOCK_BASE}/gmb/stop/")), 2);
    // Both directions of each Citybus route are listed
    assert_eq!(mock.calls(&format!("{MOCK_BASE}/ctb/route-stop/CTB/2/inbound")), 1);
}

fn ctb_route(id: usize) -> Route {
    Route {
        route_id: id.to_string(),
        bound: Bound::Outbound,
        origin_name: "A".to_string(),
        destination_name: "B".to_string(),
        provider: Provider::Ctb,
        provider_route_id: None,
        region: None,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shared_stops_are_fetched_once_under_concurrency() {
    const ROUTES: usize = 40;
    const SHARED: [&str; 3] = ["100", "200", "300"];

    let mut mock = MockFetcher::new();
    for route in 0..ROUTES {
        for direction in ["outbound", "inbound"] {
            let listing: Vec<_> = SHARED
                .iter()
                .enumerate()
                .map(|(i, stop)| json!({"stop": stop, "seq": i + 1}))
                .collect();
            mock = mock.with(
                format!("{MOCK_BASE}/ctb/route-stop/CTB/{route}/{direction}"),
                json!({"data": listing}),
            );
        }
    }
    for stop in SHARED {
        mock = mock.with(
            format!("{MOCK_BASE}/ctb/stop/{stop}"),
            json!({"data": {"name_en": format!("Stop {stop}"), "lat": "22.3", "long": "114.1"}}),
        );
    }
    let (mock, fetcher) = mock.shared();

    let routes = RouteCollections {
        ctb_routes: (0..ROUTES).map(ctb_route).collect(),
        ..RouteCollections::default()
    };
    let endpoints = mock_endpoints();
    let pool = WorkerPool::new(8);
    let listings = fetch_listings(&fetcher, &endpoints, &pool, &routes).await;
    let stops = resolve_stops(&fetcher, &endpoints, &pool, &listings).await;

    assert_eq!(stops.ctb_stops.len(), SHARED.len());
    for stop in SHARED {
        assert_eq!(mock.calls(&format!("{MOCK_BASE}/ctb/stop/{stop}")), 1, "stop {stop}");
    }
    assert_eq!(
        mock.calls_with_prefix(&format!("{MOCK_BASE}/ctb/route-stop/")),
        ROUTES * 2
    );
    assert!(mock.repeated_urls().is_empty(), "{:?}", mock.repeated_urls());
}

#[tokio::test]
async fn failed_detail_omits_only_that_stop() {
    let (_, fetcher) = network()
        .failing(format!("{MOCK_BASE}/ctb/stop/001"), 500)
        .shared();
    let endpoints = mock_endpoints();
    let pool = WorkerPool::default();

    let routes = harvest_routes(&fetcher, &endpoints, &pool).await;
    let listings = fetch_listings(&fetcher, &endpoints, &pool, &routes).await;
    let stops = resolve_stops(&fetcher, &endpoints, &pool, &listings).await;

    assert!(!stops.ctb_stops.contains_key("001"));
    assert!(stops.ctb_stops.contains_key("002"));
    assert_eq!(stops.kmb_stops.len(), 2);
}
