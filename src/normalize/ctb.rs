//! Citybus route normalizer

use serde_json::Value;
use tracing::warn;

use super::fields::{text, FallbackChain};
use super::RouteDeduper;
use crate::{Bound, Provider, Route};

/// Direction assumed when a record carries none
pub const DEFAULT_DIRECTION: &str = "outbound";

/// Destination: English name, then Chinese name, then a placeholder
const DESTINATION: FallbackChain<'static> =
    FallbackChain::new(&["dest_en", "dest_tc"]).or("Unknown Destination");

/// Map a Citybus direction word onto a bound flag
pub fn direction_to_bound(direction: &str) -> Bound {
    match direction.to_ascii_lowercase().as_str() {
        "outbound" | "o" => Bound::Outbound,
        _ => Bound::Inbound,
    }
}

/// Normalize the Citybus route list.
///
/// Records without a route id or origin are dropped. Deduplication compares
/// the bound flag each direction word maps to, so `outbound` and `Outbound`
/// are one route.
pub fn normalize_ctb(records: &[Value]) -> Vec<Route> {
    let mut routes = RouteDeduper::new(Provider::Ctb);

    for record in records {
        let (Some(route_id), Some(origin)) = (text(record, "route"), text(record, "orig_en"))
        else {
            warn!(provider = "ctb", record = %record, "Skipping route record without route or origin");
            continue;
        };

        let direction = text(record, "direction").unwrap_or_else(|| DEFAULT_DIRECTION.to_string());
        routes.insert(Route {
            route_id,
            bound: direction_to_bound(&direction),
            origin_name: origin,
            destination_name: DESTINATION.resolve(record),
            provider: Provider::Ctb,
            provider_route_id: None,
            region: None,
        });
    }

    routes.into_routes()
}
