//! Route-stop sequencing
//!
//! Produces, for every normalized route, its stops in ascending `seq` order.
//! KMB publishes every route's stops in one bulk list; Citybus and minibus
//! need one request per route, run on the worker pool. Those per-route
//! listings are fetched once per cycle by [`fetch_listings`] and shared with
//! the stop resolver.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{info, warn};

use crate::fetcher::endpoints::Endpoints;
use crate::fetcher::SharedFetcher;
use crate::normalize::fields::{self, number, text, FallbackChain};
use crate::normalize::fetch_records;
use crate::pool::WorkerPool;
use crate::snapshot::{RouteCollections, RouteStopCollections};
use crate::{Bound, Provider, Route, RouteStop};

/// Directions listed for every Citybus route, whatever its own bound
pub const CTB_DIRECTIONS: [&str; 2] = ["outbound", "inbound"];

/// Citybus listings name the stop `stop` in some revisions, `stop_id` in others
const CTB_STOP_ID: FallbackChain<'static> = FallbackChain::new(&["stop_id", "stop"]);

/// One entry of a per-route stop listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedStop {
    /// Provider-scoped stop id
    pub stop_id: String,
    /// Position on the route, when the listing carries a usable one
    pub seq: Option<u32>,
    /// Stop name carried by the listing (minibus only)
    pub name: Option<String>,
}

/// Parse a Citybus route-stop response (`data: [{stop_id|stop, seq}]`)
pub fn parse_ctb_listing(payload: &Value) -> Vec<ListedStop> {
    fields::data_list(payload)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    Some(ListedStop {
                        stop_id: CTB_STOP_ID.first(entry)?,
                        seq: number(entry, "seq"),
                        name: None,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Parse a minibus route-stop response (`data.route_stops: [{stop_id, stop_seq, name_en}]`)
pub fn parse_minibus_listing(payload: &Value) -> Vec<ListedStop> {
    payload
        .get("data")
        .and_then(|data| data.get("route_stops"))
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    Some(ListedStop {
                        stop_id: text(entry, "stop_id")?,
                        seq: number(entry, "stop_seq"),
                        name: text(entry, "name_en"),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Citybus direction word for a route's bound
pub fn ctb_direction(bound: &Bound) -> &'static str {
    match bound {
        Bound::Outbound => "outbound",
        _ => "inbound",
    }
}

/// Per-route stop listings of one cycle.
///
/// Citybus listings cover both directions of every distinct route id; minibus
/// listings follow route order. A listing that failed to load is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteStopListings {
    /// Citybus listings keyed by `(route, direction word)`
    pub ctb: BTreeMap<(String, String), Vec<ListedStop>>,
    /// Minibus listings as `(route key, listing)`, in route order
    pub minibus: Vec<(String, Vec<ListedStop>)>,
}

impl RouteStopListings {
    /// Citybus listing for a route's own direction
    pub fn ctb_listing(&self, route: &Route) -> Vec<ListedStop> {
        self.ctb
            .get(&(route.route_id.clone(), ctb_direction(&route.bound).to_string()))
            .cloned()
            .unwrap_or_default()
    }
}

/// Fetch `(key, url)` listings on the pool, in job order.
///
/// A failed fetch is logged and yields an empty listing under its key.
async fn fetch_each<K>(
    fetcher: &SharedFetcher,
    pool: &WorkerPool,
    provider: Provider,
    jobs: Vec<(K, String)>,
    parse: fn(&Value) -> Vec<ListedStop>,
) -> Vec<(K, Vec<ListedStop>)>
where
    K: Send + 'static,
{
    pool.run_ordered(jobs, |(key, url)| {
        let fetcher = fetcher.clone();
        async move {
            match fetcher.fetch(&url).await {
                Ok(payload) => (key, parse(&payload)),
                Err(e) => {
                    warn!(provider = %provider, url = %url, error = %e, "Failed to load route-stop listing");
                    (key, Vec::new())
                }
            }
        }
    })
    .await
}

/// Fetch every Citybus and minibus route-stop listing once
pub async fn fetch_listings(
    fetcher: &SharedFetcher,
    endpoints: &Endpoints,
    pool: &WorkerPool,
    routes: &RouteCollections,
) -> RouteStopListings {
    let route_ids: BTreeSet<&str> = routes
        .ctb_routes
        .iter()
        .map(|route| route.route_id.as_str())
        .collect();
    let ctb_jobs: Vec<_> = route_ids
        .iter()
        .flat_map(|route_id| {
            CTB_DIRECTIONS.into_iter().map(move |direction| {
                let url = endpoints.ctb_route_stops(route_id, direction);
                ((route_id.to_string(), direction.to_string()), url)
            })
        })
        .collect();

    let minibus_jobs: Vec<_> = routes
        .minibus_routes
        .iter()
        .filter_map(|route| {
            let Some(route_id) = route.provider_route_id.as_deref() else {
                warn!(provider = "minibus", route = %route.key(), "Route has no provider route id");
                return None;
            };
            let url = endpoints.minibus_route_stops(route_id, route.bound.as_code());
            Some((route.key().to_string(), url))
        })
        .collect();

    let (ctb, minibus) = tokio::join!(
        fetch_each(fetcher, pool, Provider::Ctb, ctb_jobs, parse_ctb_listing),
        fetch_each(fetcher, pool, Provider::Minibus, minibus_jobs, parse_minibus_listing),
    );
    info!(
        ctb_routes = route_ids.len(),
        ctb_listings = ctb.len(),
        minibus_listings = minibus.len(),
        "Route-stop listings fetched"
    );

    RouteStopListings {
        ctb: ctb.into_iter().collect(),
        minibus,
    }
}

/// Sort a listing by numeric `seq`, dropping entries without one
pub fn into_sequence(listing: Vec<ListedStop>, provider: Provider, key: &str) -> Vec<RouteStop> {
    let mut stops: Vec<RouteStop> = listing
        .into_iter()
        .filter_map(|entry| match entry.seq {
            Some(seq) => Some(RouteStop {
                stop_id: entry.stop_id,
                seq,
            }),
            None => {
                warn!(provider = %provider, route = %key, stop = %entry.stop_id, "Skipping route-stop without numeric seq");
                None
            }
        })
        .collect();
    stops.sort_by_key(|stop| stop.seq);
    stops
}

/// Partition the KMB bulk route-stop list by route key.
///
/// Every KMB route gets an entry, empty if the bulk list has nothing for it.
/// The bulk list repeats positions once per service type; only the first
/// entry per `seq` is kept.
pub fn partition_kmb(
    records: &[Value],
    routes: &[Route],
) -> BTreeMap<String, Vec<RouteStop>> {
    let mut by_route: HashMap<(String, String), Vec<ListedStop>> = HashMap::new();
    for record in records {
        let (Some(route), Some(bound), Some(stop_id)) = (
            text(record, "route"),
            text(record, "bound"),
            text(record, "stop"),
        ) else {
            warn!(provider = "kmb", record = %record, "Skipping incomplete route-stop record");
            continue;
        };
        by_route.entry((route, bound)).or_default().push(ListedStop {
            stop_id,
            seq: number(record, "seq"),
            name: None,
        });
    }

    routes
        .iter()
        .map(|route| {
            let key = route.key().to_string();
            let listing = by_route
                .remove(&(route.route_id.clone(), route.bound.as_code().to_string()))
                .unwrap_or_default();
            let mut seen = HashSet::new();
            let mut stops = into_sequence(listing, Provider::Kmb, &key);
            stops.retain(|stop| seen.insert(stop.seq));
            (key, stops)
        })
        .collect()
}

async fn sequence_kmb(
    fetcher: &SharedFetcher,
    endpoints: &Endpoints,
    routes: &[Route],
) -> BTreeMap<String, Vec<RouteStop>> {
    if routes.is_empty() {
        return BTreeMap::new();
    }
    let records = fetch_records(fetcher, &endpoints.kmb_route_stops(), Provider::Kmb).await;
    partition_kmb(&records, routes)
}

/// Build every provider's route-stop sequences.
///
/// Citybus and minibus sequences come from the shared `listings`; a route
/// whose listing failed gets an empty sequence.
pub async fn sequence_routes(
    fetcher: &SharedFetcher,
    endpoints: &Endpoints,
    routes: &RouteCollections,
    listings: &RouteStopListings,
) -> RouteStopCollections {
    let kmb_route_stops = sequence_kmb(fetcher, endpoints, &routes.kmb_routes).await;

    let ctb_route_stops: BTreeMap<String, Vec<RouteStop>> = routes
        .ctb_routes
        .iter()
        .map(|route| {
            let key = route.key().to_string();
            let stops = into_sequence(listings.ctb_listing(route), Provider::Ctb, &key);
            (key, stops)
        })
        .collect();

    let minibus_route_stops: BTreeMap<String, Vec<RouteStop>> = listings
        .minibus
        .iter()
        .map(|(key, listing)| {
            let stops = into_sequence(listing.clone(), Provider::Minibus, key);
            (key.clone(), stops)
        })
        .collect();

    info!(
        kmb = kmb_route_stops.len(),
        ctb = ctb_route_stops.len(),
        minibus = minibus_route_stops.len(),
        "Route-stop sequences built"
    );

    RouteStopCollections {
        kmb_route_stops,
        ctb_route_stops,
        minibus_route_stops,
    }
}
