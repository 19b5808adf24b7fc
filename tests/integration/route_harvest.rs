//! Route normalization against a mocked upstream

use transit_harvester::normalize::harvest_routes;
use transit_harvester::pool::WorkerPool;
use transit_harvester::Bound;

use crate::support::{mock_endpoints, network, MOCK_BASE};

#[tokio::test]
async fn harvests_all_three_providers() {
    let (mock, fetcher) = network().shared();
    let routes = harvest_routes(&fetcher, &mock_endpoints(), &WorkerPool::new(3)).await;

    let kmb: Vec<_> = routes.kmb_routes.iter().map(|r| r.key().to_string()).collect();
    assert_eq!(kmb, vec!["1A-O", "1A-I"]);
    // Service type 2 repeats 1A-O; the first record wins
    assert_eq!(routes.kmb_routes[0].destination_name, "CHUK YUEN ESTATE");

    let ctb: Vec<_> = routes.ctb_routes.iter().map(|r| r.key().to_string()).collect();
    assert_eq!(ctb, vec!["1-O", "2-O"]);

    let minibus: Vec<_> = routes.minibus_routes.iter().map(|r| r.key().to_string()).collect();
    assert_eq!(minibus, vec!["24M-1", "24M-2"]);
    assert_eq!(routes.minibus_routes[0].bound, Bound::Sequence("1".to_string()));
    assert_eq!(routes.minibus_routes[0].provider_route_id.as_deref(), Some("2004806"));

    // NT/101 has no detail upstream and is skipped after its single attempt
    assert_eq!(mock.calls(&format!("{MOCK_BASE}/gmb/route/NT/101")), 1);
    assert_eq!(routes.len(), 6);
}

#[tokio::test]
async fn failed_provider_list_only_empties_that_provider() {
    let (_, fetcher) = network()
        .failing(format!("{MOCK_BASE}/kmb/route/"), 503)
        .shared();
    let routes = harvest_routes(&fetcher, &mock_endpoints(), &WorkerPool::default()).await;

    assert!(routes.kmb_routes.is_empty());
    assert_eq!(routes.ctb_routes.len(), 2);
    assert_eq!(routes.minibus_routes.len(), 2);
}

#[tokio::test]
async fn failed_minibus_index_yields_no_minibus_routes() {
    let (mock, fetcher) = network()
        .failing(format!("{MOCK_BASE}/gmb/route"), 500)
        .shared();
    let routes = harvest_routes(&fetcher, &mock_endpoints(), &WorkerPool::default()).await;

    assert!(routes.minibus_routes.is_empty());
    assert_eq!(mock.calls_with_prefix(&format!("{MOCK_BASE}/gmb/route/")), 0);
    assert_eq!(routes.kmb_routes.len(), 2);
}
