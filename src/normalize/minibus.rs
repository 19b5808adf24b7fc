//! Green minibus route normalizer
//!
//! The minibus index only lists route numbers per region. Directions, origin
//! and destination live behind a per-route detail endpoint, so this is the one
//! normalizer that fetches: one detail request per (region, route), fanned out
//! over the worker pool.

use serde_json::Value;
use tracing::{info, warn};

use super::fields::{text, FallbackChain};
use super::RouteDeduper;
use crate::fetcher::endpoints::Endpoints;
use crate::fetcher::SharedFetcher;
use crate::pool::WorkerPool;
use crate::{Bound, Provider, Route};

/// Placeholder for names the minibus API has not filled in yet
pub const PENDING_NAME: &str = "Loading...";

const ORIGIN: FallbackChain<'static> = FallbackChain::new(&["orig_en"]).or(PENDING_NAME);
const DESTINATION: FallbackChain<'static> = FallbackChain::new(&["dest_en"]).or(PENDING_NAME);

/// A route number listed under a region in the minibus index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinibusCandidate {
    /// Region code (e.g. `HKI`, `KLN`, `NT`)
    pub region: String,
    /// Public route number
    pub route: String,
}

/// Flatten the `data.routes` region map of the index response
pub fn route_index(payload: &Value) -> Vec<MinibusCandidate> {
    let Some(regions) = payload
        .get("data")
        .and_then(|data| data.get("routes"))
        .and_then(Value::as_object)
    else {
        warn!(provider = "minibus", "Route index has no data.routes map");
        return Vec::new();
    };

    let mut candidates = Vec::new();
    for (region, routes) in regions {
        let Some(routes) = routes.as_array() else {
            warn!(provider = "minibus", region = %region, "Region entry is not a list");
            continue;
        };
        for route in routes {
            let route = match route {
                Value::String(s) => s.trim().to_string(),
                Value::Number(n) => n.to_string(),
                _ => continue,
            };
            if !route.is_empty() {
                candidates.push(MinibusCandidate {
                    region: region.clone(),
                    route,
                });
            }
        }
    }
    candidates
}

/// Turn detail responses into routes, one per direction.
///
/// `details` must be in index order; the key is `route + route_seq`, so a
/// route number reused in another region keeps only its first-seen entry.
pub fn normalize_minibus(details: &[(MinibusCandidate, Value)]) -> Vec<Route> {
    let mut routes = RouteDeduper::new(Provider::Minibus);

    for (candidate, payload) in details {
        let Some(service) = payload
            .get("data")
            .and_then(Value::as_array)
            .and_then(|services| services.first())
        else {
            warn!(provider = "minibus", route = %candidate.route, region = %candidate.region, "Route detail has no service");
            continue;
        };
        let Some(provider_route_id) = text(service, "route_id") else {
            warn!(provider = "minibus", route = %candidate.route, "Route detail has no route_id");
            continue;
        };
        let Some(directions) = service.get("directions").and_then(Value::as_array) else {
            continue;
        };

        for direction in directions {
            let Some(route_seq) = text(direction, "route_seq") else {
                warn!(provider = "minibus", route = %candidate.route, "Skipping direction without route_seq");
                continue;
            };
            routes.insert(Route {
                route_id: candidate.route.clone(),
                bound: Bound::Sequence(route_seq),
                origin_name: ORIGIN.resolve(direction),
                destination_name: DESTINATION.resolve(direction),
                provider: Provider::Minibus,
                provider_route_id: Some(provider_route_id.clone()),
                region: Some(candidate.region.clone()),
            });
        }
    }

    routes.into_routes()
}

/// Fetch the minibus index and every route's detail, then normalize.
///
/// A failed detail fetch skips that route only.
pub async fn harvest_minibus(
    fetcher: &SharedFetcher,
    endpoints: &Endpoints,
    pool: &WorkerPool,
) -> Vec<Route> {
    let index = match fetcher.fetch(&endpoints.minibus_routes()).await {
        Ok(index) => index,
        Err(e) => {
            warn!(provider = "minibus", error = %e, "Failed to load route index");
            return Vec::new();
        }
    };

    let candidates = route_index(&index);
    info!(provider = "minibus", candidates = candidates.len(), "Fetching route details");

    let details = pool
        .run_ordered(candidates, |candidate| {
            let fetcher = fetcher.clone();
            let url = endpoints.minibus_route(&candidate.region, &candidate.route);
            async move {
                match fetcher.fetch(&url).await {
                    Ok(payload) => Some((candidate, payload)),
                    Err(e) => {
                        warn!(
                            provider = "minibus",
                            route = %candidate.route,
                            region = %candidate.region,
                            error = %e,
                            "Failed to load route detail"
                        );
                        None
                    }
                }
            }
        })
        .await;

    let details: Vec<_> = details.into_iter().flatten().collect();
    normalize_minibus(&details)
}
