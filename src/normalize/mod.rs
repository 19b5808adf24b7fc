//! Provider route normalizers
//!
//! Each provider publishes routes in its own schema. The normalizers map them
//! onto [`Route`] and drop duplicates by [`RouteKey`], keeping the first
//! record seen and the order records arrived in.

use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, info, warn};

pub mod ctb;
pub mod fields;
pub mod kmb;
pub mod minibus;

pub use ctb::normalize_ctb;
pub use kmb::normalize_kmb;
pub use minibus::{harvest_minibus, normalize_minibus, MinibusCandidate};

use crate::fetcher::endpoints::Endpoints;
use crate::fetcher::SharedFetcher;
use crate::pool::WorkerPool;
use crate::snapshot::RouteCollections;
use crate::{Provider, Route, RouteKey};

/// Insertion-ordered route list that rejects repeated keys
#[derive(Debug)]
pub struct RouteDeduper {
    provider: Provider,
    seen: HashSet<RouteKey>,
    routes: Vec<Route>,
}

impl RouteDeduper {
    /// Empty list for `provider`
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            seen: HashSet::new(),
            routes: Vec::new(),
        }
    }

    /// Append `route` unless its mapped `route + bound` key was already taken;
    /// returns whether it was kept
    pub fn insert(&mut self, route: Route) -> bool {
        let key = route.key();
        if !self.seen.insert(key.clone()) {
            debug!(provider = %self.provider, key = %key, "Dropping duplicate route");
            return false;
        }
        self.routes.push(route);
        true
    }

    /// Number of routes kept so far
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no route was kept
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Kept routes, in first-seen order
    pub fn into_routes(self) -> Vec<Route> {
        self.routes
    }
}

/// Fetch a provider's route list envelope and return its `data` records.
///
/// Any failure is logged and yields no records, so the provider contributes
/// an empty collection.
pub async fn fetch_records(fetcher: &SharedFetcher, url: &str, provider: Provider) -> Vec<Value> {
    match fetcher.fetch(url).await {
        Ok(payload) => match fields::data_list(&payload) {
            Some(records) => records.clone(),
            None => {
                warn!(provider = %provider, url = %url, "Response has no data list");
                Vec::new()
            }
        },
        Err(e) => {
            warn!(provider = %provider, error = %e, "Failed to load route list");
            Vec::new()
        }
    }
}

/// Run all three route normalizers concurrently
pub async fn harvest_routes(
    fetcher: &SharedFetcher,
    endpoints: &Endpoints,
    pool: &WorkerPool,
) -> RouteCollections {
    let kmb = async {
        let records = fetch_records(fetcher, &endpoints.kmb_routes(), Provider::Kmb).await;
        normalize_kmb(&records)
    };
    let ctb = async {
        let records = fetch_records(fetcher, &endpoints.ctb_routes(), Provider::Ctb).await;
        normalize_ctb(&records)
    };
    let minibus = harvest_minibus(fetcher, endpoints, pool);

    let (kmb_routes, ctb_routes, minibus_routes) = tokio::join!(kmb, ctb, minibus);

    info!(
        kmb = kmb_routes.len(),
        ctb = ctb_routes.len(),
        minibus = minibus_routes.len(),
        "Routes normalized"
    );

    RouteCollections {
        kmb_routes,
        ctb_routes,
        minibus_routes,
    }
}
