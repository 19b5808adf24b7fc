//! Dataset snapshots
//!
//! Four datasets are persisted independently, each as one JSON document of
//! provider-keyed collections plus a creation `timestamp` in epoch
//! milliseconds.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

pub mod freshness;
pub mod lock;
pub mod store;

pub use freshness::{classify, Freshness};
pub use lock::with_exclusive;
pub use store::{SnapshotStore, StagedSnapshot};

use crate::{FareEntry, Provider, Route, RouteStop, Stop};

/// Name of the advisory lock file inside the data directory
pub const LOCK_FILE_NAME: &str = ".harvest.lock";

/// One of the four persisted datasets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dataset {
    /// Route lists
    Routes,
    /// Stop details
    Stops,
    /// Ordered stop lists per route
    RouteStops,
    /// Fare tables
    Fares,
}

impl Dataset {
    /// Every dataset, in persistence order
    pub const ALL: [Dataset; 4] = [
        Dataset::Routes,
        Dataset::Stops,
        Dataset::RouteStops,
        Dataset::Fares,
    ];

    /// File name inside the data directory
    pub fn file_name(&self) -> &'static str {
        match self {
            Dataset::Routes => "route_data.json",
            Dataset::Stops => "stop_data.json",
            Dataset::RouteStops => "route-stop_data.json",
            Dataset::Fares => "route_fee_data.json",
        }
    }

    /// Label used in logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            Dataset::Routes => "routes",
            Dataset::Stops => "stops",
            Dataset::RouteStops => "route_stops",
            Dataset::Fares => "fares",
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A dataset body with its creation time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot<T> {
    /// Provider-keyed collections
    #[serde(flatten)]
    pub data: T,
    /// Creation time, epoch milliseconds
    pub timestamp: i64,
}

impl<T> Snapshot<T> {
    /// Wrap `data` with the given creation time
    pub fn new(data: T, timestamp: i64) -> Self {
        Self { data, timestamp }
    }
}

/// Normalized routes of every provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteCollections {
    /// KMB routes
    #[serde(default)]
    pub kmb_routes: Vec<Route>,
    /// Citybus routes
    #[serde(default)]
    pub ctb_routes: Vec<Route>,
    /// Minibus routes
    #[serde(default)]
    pub minibus_routes: Vec<Route>,
}

impl RouteCollections {
    /// Routes of one provider
    pub fn for_provider(&self, provider: Provider) -> &[Route] {
        match provider {
            Provider::Kmb => &self.kmb_routes,
            Provider::Ctb => &self.ctb_routes,
            Provider::Minibus => &self.minibus_routes,
        }
    }

    /// Total route count
    pub fn len(&self) -> usize {
        self.kmb_routes.len() + self.ctb_routes.len() + self.minibus_routes.len()
    }

    /// Whether every provider came back empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Stop details keyed by provider-scoped stop id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StopCollections {
    /// KMB stops
    #[serde(default)]
    pub kmb_stops: BTreeMap<String, Stop>,
    /// Citybus stops
    #[serde(default)]
    pub ctb_stops: BTreeMap<String, Stop>,
    /// Minibus stops
    #[serde(default)]
    pub minibus_stops: BTreeMap<String, Stop>,
}

impl StopCollections {
    /// Total stop count
    pub fn len(&self) -> usize {
        self.kmb_stops.len() + self.ctb_stops.len() + self.minibus_stops.len()
    }

    /// Whether no stop was resolved
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ordered stop lists keyed by `<route>-<bound>`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteStopCollections {
    /// KMB sequences
    #[serde(default)]
    pub kmb_route_stops: BTreeMap<String, Vec<RouteStop>>,
    /// Citybus sequences
    #[serde(default)]
    pub ctb_route_stops: BTreeMap<String, Vec<RouteStop>>,
    /// Minibus sequences
    #[serde(default)]
    pub minibus_route_stops: BTreeMap<String, Vec<RouteStop>>,
}

impl RouteStopCollections {
    /// Total number of route keys
    pub fn len(&self) -> usize {
        self.kmb_route_stops.len() + self.ctb_route_stops.len() + self.minibus_route_stops.len()
    }

    /// Whether no route has a sequence
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fare rows per provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FareCollections {
    /// KMB fares
    #[serde(default)]
    pub kmb_routes: Vec<FareEntry>,
    /// Citybus fares
    #[serde(default)]
    pub ctb_routes: Vec<FareEntry>,
    /// Minibus fares
    #[serde(default)]
    pub minibus_routes: Vec<FareEntry>,
}

impl FareCollections {
    /// Total fare rows
    pub fn len(&self) -> usize {
        self.kmb_routes.len() + self.ctb_routes.len() + self.minibus_routes.len()
    }

    /// Whether both feeds came back empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Classify every dataset file of `store` against `window`, as of `now_ms`
pub fn check_all(
    store: &SnapshotStore,
    window: std::time::Duration,
    now_ms: i64,
) -> Vec<(Dataset, Freshness)> {
    Dataset::ALL
        .iter()
        .map(|&dataset| (dataset, classify(&store.path_for(dataset), window, now_ms)))
        .collect()
}

/// Output of one pipeline run, ready to persist
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HarvestOutput {
    /// Route lists
    pub routes: RouteCollections,
    /// Stop details
    pub stops: StopCollections,
    /// Route-stop sequences
    pub route_stops: RouteStopCollections,
    /// Fare tables
    pub fares: FareCollections,
}

/// Persistence errors
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// Filesystem failure
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File or directory involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Snapshot could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The data directory lock could not be taken
    #[error("lock error on {}: {reason}", path.display())]
    Lock {
        /// Lock file
        path: PathBuf,
        /// Why locking failed
        reason: String,
    },
}

impl SnapshotError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SnapshotError::Io {
            path: path.into(),
            source,
        }
    }
}
