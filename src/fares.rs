//! Fare feed import
//!
//! The Transport Department publishes fares as GeoJSON feature collections,
//! one for franchised buses and one for green minibuses. Each feature's
//! `properties` describe one fare section: a route direction and the stop
//! sequence the fare applies from.

use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use tracing::{info, warn};

use crate::fetcher::endpoints::Endpoints;
use crate::fetcher::SharedFetcher;
use crate::normalize::fields::{number, text, FallbackChain};
use crate::snapshot::FareCollections;
use crate::{Bound, FareEntry, Provider};

const ORIGIN: FallbackChain<'static> = FallbackChain::new(&["locStartNameE"]).or("Unknown");
const DESTINATION: FallbackChain<'static> = FallbackChain::new(&["locEndNameE"]).or("Unknown");

/// Parse a fare amount given as a JSON number or a numeric string
pub fn parse_fare(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

/// Convert one feature's properties into a fare row for `provider`.
///
/// Route name, stop sequence and fare are required; origin and destination
/// default to `"Unknown"`.
pub fn parse_fare_entry(properties: &Value, provider: Provider) -> Option<FareEntry> {
    let route_id = text(properties, "routeNameE");
    let seq = number(properties, "stopSeq");
    let full_fare = properties.get("fullFare").and_then(parse_fare);
    let (Some(route_id), Some(seq), Some(full_fare)) = (route_id, seq, full_fare) else {
        warn!(provider = %provider, properties = %properties, "Skipping incomplete fare record");
        return None;
    };

    let bound = text(properties, "routeSeq")
        .map(|raw| Bound::from_fare_seq(&raw))
        .unwrap_or(Bound::Outbound);

    Some(FareEntry {
        route_id,
        origin_name: ORIGIN.resolve(properties),
        destination_name: DESTINATION.resolve(properties),
        full_fare,
        provider,
        seq,
        bound,
    })
}

/// `properties` of every feature in a feature collection
pub fn feature_properties(payload: &Value) -> Vec<&Value> {
    payload
        .get("features")
        .and_then(Value::as_array)
        .map(|features| {
            features
                .iter()
                .filter_map(|feature| feature.get("properties"))
                .collect()
        })
        .unwrap_or_default()
}

/// Split the bus feed by company code; unknown operators are dropped
pub fn partition_bus_fares(payload: &Value) -> (Vec<FareEntry>, Vec<FareEntry>) {
    let mut kmb = Vec::new();
    let mut ctb = Vec::new();
    let mut dropped = 0usize;

    for properties in feature_properties(payload) {
        let provider = text(properties, "companyCode")
            .as_deref()
            .and_then(Provider::from_company_code);
        let Some(provider) = provider else {
            dropped += 1;
            continue;
        };
        if let Some(entry) = parse_fare_entry(properties, provider) {
            match provider {
                Provider::Kmb => kmb.push(entry),
                Provider::Ctb => ctb.push(entry),
                Provider::Minibus => {}
            }
        }
    }

    if dropped > 0 {
        info!(dropped, "Dropped fares of other operators");
    }
    (kmb, ctb)
}

/// Every record of the minibus feed, as minibus fares
pub fn minibus_fares(payload: &Value) -> Vec<FareEntry> {
    feature_properties(payload)
        .into_iter()
        .filter_map(|properties| parse_fare_entry(properties, Provider::Minibus))
        .collect()
}

async fn fetch_feed(fetcher: &SharedFetcher, url: &str, feed: &'static str) -> Option<Value> {
    match fetcher.fetch(url).await {
        Ok(payload) => Some(payload),
        Err(e) => {
            warn!(feed, error = %e, "Failed to load fare feed");
            None
        }
    }
}

/// Fetch both fare feeds concurrently and build the fare collections.
///
/// A failed feed leaves only its own lists empty.
pub async fn import_fares(fetcher: &SharedFetcher, endpoints: &Endpoints) -> FareCollections {
    let bus_url = endpoints.bus_fares();
    let minibus_url = endpoints.minibus_fares();
    let (bus, minibus) = tokio::join!(
        fetch_feed(fetcher, &bus_url, "bus"),
        fetch_feed(fetcher, &minibus_url, "minibus"),
    );

    let (kmb_routes, ctb_routes) = bus.as_ref().map(partition_bus_fares).unwrap_or_default();
    let minibus_routes = minibus.as_ref().map(minibus_fares).unwrap_or_default();

    info!(
        kmb = kmb_routes.len(),
        ctb = ctb_routes.len(),
        minibus = minibus_routes.len(),
        "Fares imported"
    );

    FareCollections {
        kmb_routes,
        ctb_routes,
        minibus_routes,
    }
}
