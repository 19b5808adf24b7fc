//! KMB route normalizer

use serde_json::Value;
use tracing::warn;

use super::fields::text;
use super::RouteDeduper;
use crate::{Bound, Provider, Route};

/// Normalize the KMB route list.
///
/// Records missing any of route, bound, origin or destination are dropped.
/// The first record per `route + bound` wins, comparing the mapped bound so
/// `O` and `o` are the same direction; the feed repeats routes once per
/// service type.
pub fn normalize_kmb(records: &[Value]) -> Vec<Route> {
    let mut routes = RouteDeduper::new(Provider::Kmb);

    for record in records {
        let (Some(route_id), Some(bound), Some(origin), Some(destination)) = (
            text(record, "route"),
            text(record, "bound"),
            text(record, "orig_en"),
            text(record, "dest_en"),
        ) else {
            warn!(provider = "kmb", record = %record, "Skipping incomplete route record");
            continue;
        };

        routes.insert(Route {
            route_id,
            bound: Bound::from_code(&bound),
            origin_name: origin,
            destination_name: destination,
            provider: Provider::Kmb,
            provider_route_id: None,
            region: None,
        });
    }

    routes.into_routes()
}
