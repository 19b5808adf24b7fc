//! Stop resolution
//!
//! KMB publishes every stop in one bulk list. Citybus and minibus stop ids
//! are only discoverable from per-route stop listings, so resolution runs in
//! two sequential phases per provider:
//!
//! 1. discovery: collect the distinct stop ids of every route's listing
//!    (see [`fetch_listings`](crate::sequence::fetch_listings));
//! 2. detail: fetch each distinct id exactly once on the worker pool.
//!
//! Phase 2 starts only after phase 1 has seen every route, which is what
//! keeps a stop shared by many routes down to a single detail request.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

use crate::fetcher::endpoints::Endpoints;
use crate::fetcher::SharedFetcher;
use crate::normalize::fetch_records;
use crate::normalize::fields::{first_present, text, FallbackChain};
use crate::pool::WorkerPool;
use crate::sequence::RouteStopListings;
use crate::snapshot::StopCollections;
use crate::{Coordinate, Provider, Stop};

/// Name used when no source carries one
pub const UNKNOWN_STOP_NAME: &str = "Unknown";

const BUS_STOP_NAME: FallbackChain<'static> =
    FallbackChain::new(&["name_en", "name_tc"]).or(UNKNOWN_STOP_NAME);

/// Build a stop from a bus-style record (`name_en`, `lat`, `long`)
fn bus_stop(stop_id: String, record: &Value, provider: Provider) -> Option<Stop> {
    let coordinates = (
        record.get("lat").and_then(Coordinate::from_value),
        record.get("long").and_then(Coordinate::from_value),
    );
    let (Some(latitude), Some(longitude)) = coordinates else {
        warn!(provider = %provider, stop = %stop_id, "Skipping stop without coordinates");
        return None;
    };
    Some(Stop {
        name: BUS_STOP_NAME.resolve(record),
        stop_id,
        latitude,
        longitude,
    })
}

/// Parse the KMB bulk stop list (`data: [{stop, name_en, lat, long}]`)
pub fn parse_kmb_stops(records: &[Value]) -> BTreeMap<String, Stop> {
    let mut stops = BTreeMap::new();
    for record in records {
        let Some(stop_id) = text(record, "stop") else {
            warn!(provider = "kmb", record = %record, "Skipping stop without id");
            continue;
        };
        if stops.contains_key(&stop_id) {
            continue;
        }
        if let Some(stop) = bus_stop(stop_id.clone(), record, Provider::Kmb) {
            stops.insert(stop_id, stop);
        }
    }
    stops
}

/// Parse a Citybus stop detail response (`data: {name_en, lat, long}`)
pub fn parse_ctb_stop(stop_id: &str, payload: &Value) -> Option<Stop> {
    let data = payload.get("data").filter(|data| data.is_object())?;
    bus_stop(stop_id.to_string(), data, Provider::Ctb)
}

/// Parse a minibus stop detail response.
///
/// Coordinates come from `data.coordinates.wgs84`. The detail usually has no
/// English name, so `name_hint` from the route-stop listing is the fallback.
pub fn parse_minibus_stop(stop_id: &str, payload: &Value, name_hint: Option<&str>) -> Option<Stop> {
    let data = payload.get("data")?;
    let wgs84 = data
        .get("coordinates")
        .and_then(|coordinates| coordinates.get("wgs84"));
    let coordinates = wgs84.map(|wgs84| {
        (
            wgs84.get("latitude").and_then(Coordinate::from_value),
            wgs84.get("longitude").and_then(Coordinate::from_value),
        )
    });
    let Some((Some(latitude), Some(longitude))) = coordinates else {
        warn!(provider = "minibus", stop = %stop_id, "Skipping stop without coordinates");
        return None;
    };

    let name = first_present([text(data, "name_en"), name_hint.map(str::to_string)])
        .unwrap_or_else(|| UNKNOWN_STOP_NAME.to_string());

    Some(Stop {
        stop_id: stop_id.to_string(),
        name,
        latitude,
        longitude,
    })
}

/// Detail phase: one fetch per distinct id; failed stops are omitted
async fn resolve_details<F>(
    fetcher: &SharedFetcher,
    pool: &WorkerPool,
    provider: Provider,
    jobs: Vec<(String, String, Option<String>)>,
    parse: F,
) -> BTreeMap<String, Stop>
where
    F: Fn(&str, &Value, Option<&str>) -> Option<Stop> + Copy + Send + Sync + 'static,
{
    pool.run_unordered(jobs, |(stop_id, url, hint)| {
        let fetcher = fetcher.clone();
        async move {
            match fetcher.fetch(&url).await {
                Ok(payload) => {
                    parse(&stop_id, &payload, hint.as_deref()).map(|stop| (stop_id, stop))
                }
                Err(e) => {
                    warn!(provider = %provider, stop = %stop_id, error = %e, "Failed to load stop detail");
                    None
                }
            }
        }
    })
    .await
    .into_iter()
    .flatten()
    .collect()
}

async fn resolve_kmb(fetcher: &SharedFetcher, endpoints: &Endpoints) -> BTreeMap<String, Stop> {
    let records = fetch_records(fetcher, &endpoints.kmb_stops(), Provider::Kmb).await;
    parse_kmb_stops(&records)
}

async fn resolve_ctb(
    fetcher: &SharedFetcher,
    endpoints: &Endpoints,
    pool: &WorkerPool,
    listings: &RouteStopListings,
) -> BTreeMap<String, Stop> {
    let stop_ids: BTreeSet<&str> = listings
        .ctb
        .values()
        .flatten()
        .map(|stop| stop.stop_id.as_str())
        .collect();
    info!(provider = "ctb", listings = listings.ctb.len(), stops = stop_ids.len(), "Stop ids discovered");

    let jobs = stop_ids
        .into_iter()
        .map(|stop_id| (stop_id.to_string(), endpoints.ctb_stop(stop_id), None))
        .collect();
    resolve_details(fetcher, pool, Provider::Ctb, jobs, |id, payload, _| {
        parse_ctb_stop(id, payload)
    })
    .await
}

async fn resolve_minibus(
    fetcher: &SharedFetcher,
    endpoints: &Endpoints,
    pool: &WorkerPool,
    listings: &RouteStopListings,
) -> BTreeMap<String, Stop> {
    // First name seen for each id, in route order
    let mut hints: BTreeMap<String, Option<String>> = BTreeMap::new();
    for stop in listings.minibus.iter().flat_map(|(_, listing)| listing) {
        let hint = hints.entry(stop.stop_id.clone()).or_default();
        if hint.is_none() {
            *hint = stop.name.clone();
        }
    }
    info!(provider = "minibus", stops = hints.len(), "Stop ids discovered");

    let jobs = hints
        .into_iter()
        .map(|(stop_id, hint)| {
            let url = endpoints.minibus_stop(&stop_id);
            (stop_id, url, hint)
        })
        .collect();
    resolve_details(fetcher, pool, Provider::Minibus, jobs, parse_minibus_stop).await
}

/// Resolve stop details for every provider from the cycle's route-stop listings
pub async fn resolve_stops(
    fetcher: &SharedFetcher,
    endpoints: &Endpoints,
    pool: &WorkerPool,
    listings: &RouteStopListings,
) -> StopCollections {
    let (kmb_stops, ctb_stops, minibus_stops) = tokio::join!(
        resolve_kmb(fetcher, endpoints),
        resolve_ctb(fetcher, endpoints, pool, listings),
        resolve_minibus(fetcher, endpoints, pool, listings),
    );

    info!(
        kmb = kmb_stops.len(),
        ctb = ctb_stops.len(),
        minibus = minibus_stops.len(),
        "Stops resolved"
    );

    StopCollections {
        kmb_stops,
        ctb_stops,
        minibus_stops,
    }
}
