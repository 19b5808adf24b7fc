//! # Transit Harvester Library
//!
//! Periodically harvests Hong Kong public transport reference data (bus and
//! minibus routes, stops, route-stop sequences and fare tables) from the
//! public government data APIs, normalizes each provider's schema into a
//! common shape and persists the result as cached JSON snapshots.
//!
//! ## Features
//!
//! - **Multi-Provider Support**: KMB and Citybus (CTB) franchised buses plus green minibus (GMB)
//! - **Resilient Fetching**: bounded exponential backoff, 429 awareness, fail-fast on client errors
//! - **Fetch-Once Stop Resolution**: shared stops are resolved exactly once per run
//! - **Bounded Fan-Out**: every per-route and per-stop phase runs on a bounded worker pool
//! - **Atomic Snapshots**: temp-file + rename persistence with a single-writer lock
//! - **Freshness Tracking**: snapshots are only regenerated once they fall out of the window
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use transit_harvester::config::HarvestConfig;
//! use transit_harvester::orchestrator::Orchestrator;
//! use transit_harvester::shutdown::ShutdownCoordinator;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HarvestConfig::default();
//! let orchestrator = Orchestrator::from_config(config, ShutdownCoordinator::shared())?;
//!
//! // One freshness check, refreshing all four datasets if any is stale
//! let outcome = orchestrator.tick(false).await?;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`fetcher`] - the retrying fetcher, the only outbound HTTP access point
//! - [`normalize`] - per-provider route normalizers with key-based deduplication
//! - [`stops`] - route-driven stop discovery and fetch-once detail resolution
//! - [`sequence`] - ordered route-stop sequences per route
//! - [`fares`] - fare feed import, independent of the route pipeline
//! - [`snapshot`] - dataset shapes, freshness classification and atomic persistence
//! - [`orchestrator`] - the poll loop tying everything together
//! - [`pool`] - the bounded worker pool shared by every fan-out phase

#![warn(missing_docs)]
#![warn(clippy::all)]

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// CLI command implementations
pub mod cli;

/// Configuration constants and runtime settings
pub mod config;

/// Fare feed import
pub mod fares;

/// HTTP fetching with retry
pub mod fetcher;

/// Tracing subscriber setup
pub mod logging;

/// Metrics collection
pub mod metrics;

/// Provider route normalizers
pub mod normalize;

/// Cache orchestration
pub mod orchestrator;

/// Bounded worker pool
pub mod pool;

/// Route-stop sequencing
pub mod sequence;

/// Graceful shutdown coordination
pub mod shutdown;

/// Dataset snapshots and persistence
pub mod snapshot;

/// Stop resolution
pub mod stops;

/// Transport provider whose data is harvested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Kowloon Motor Bus
    Kmb,
    /// Citybus
    Ctb,
    /// Green minibus
    Minibus,
}

impl Provider {
    /// All providers, in the order datasets list them
    pub const ALL: [Provider; 3] = [Provider::Kmb, Provider::Ctb, Provider::Minibus];

    /// Lowercase name used in logs, JSON and dataset keys
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Kmb => "kmb",
            Provider::Ctb => "ctb",
            Provider::Minibus => "minibus",
        }
    }

    /// Map a fare-feed company code onto a bus provider.
    ///
    /// Only the two franchised bus operators harvested here are recognized.
    pub fn from_company_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "KMB" => Some(Provider::Kmb),
            "CTB" => Some(Provider::Ctb),
            _ => None,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "kmb" => Ok(Provider::Kmb),
            "ctb" => Ok(Provider::Ctb),
            "minibus" | "gmb" => Ok(Provider::Minibus),
            _ => Err(format!("unknown provider: {s}")),
        }
    }
}

/// Direction flag of a route.
///
/// Bus providers use the letter codes `O`/`I`. Minibus routes keep the
/// provider's raw route-sequence code (e.g. `1`, `2`) because that code is
/// what the minibus route-stop endpoint is addressed by. Serialized as a
/// plain string in every dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Bound {
    /// Outbound (`O`)
    Outbound,
    /// Inbound (`I`)
    Inbound,
    /// Provider-native sequence code, kept verbatim
    Sequence(String),
}

impl Bound {
    /// Parse a bus letter code; anything else is kept as a raw code
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "O" | "o" => Bound::Outbound,
            "I" | "i" => Bound::Inbound,
            other => Bound::Sequence(other.to_string()),
        }
    }

    /// Map a fare-feed route sequence: 1 is outbound, 2 is inbound, other codes pass through
    pub fn from_fare_seq(raw: &str) -> Self {
        match raw.trim() {
            "1" => Bound::Outbound,
            "2" => Bound::Inbound,
            other => Bound::Sequence(other.to_string()),
        }
    }

    /// The string stored in datasets
    pub fn as_code(&self) -> &str {
        match self {
            Bound::Outbound => "O",
            Bound::Inbound => "I",
            Bound::Sequence(code) => code,
        }
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

impl Serialize for Bound {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_code())
    }
}

impl<'de> Deserialize<'de> for Bound {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Older snapshots stored minibus sequence codes as numbers
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::String(s) => Ok(Bound::from_code(&s)),
            serde_json::Value::Number(n) => Ok(Bound::Sequence(n.to_string())),
            other => Err(serde::de::Error::custom(format!(
                "invalid bound value: {other}"
            ))),
        }
    }
}

/// Deduplication key of a route within one provider: `<route>-<bound>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteKey(String);

impl RouteKey {
    /// Build a key from a route id and any direction code
    pub fn new(route_id: &str, direction: &str) -> Self {
        Self(format!("{route_id}-{direction}"))
    }

    /// Key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalized route record shared by all providers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// Public route number (e.g. "1A")
    #[serde(rename = "route")]
    pub route_id: String,
    /// Direction flag
    pub bound: Bound,
    /// Origin name (English)
    #[serde(rename = "orig_en")]
    pub origin_name: String,
    /// Destination name (English)
    #[serde(rename = "dest_en")]
    pub destination_name: String,
    /// Provider the route belongs to
    pub provider: Provider,
    /// Provider-internal route id (minibus only)
    #[serde(rename = "route_id", default, skip_serializing_if = "Option::is_none")]
    pub provider_route_id: Option<String>,
    /// Region code (minibus only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

impl Route {
    /// Key identifying this route inside its provider's dataset
    pub fn key(&self) -> RouteKey {
        RouteKey::new(&self.route_id, self.bound.as_code())
    }
}

/// A latitude or longitude as supplied upstream.
///
/// KMB and CTB publish coordinates as strings, the minibus API as numbers;
/// both are persisted untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Coordinate {
    /// Numeric coordinate
    Number(f64),
    /// Textual coordinate
    Text(String),
}

impl Coordinate {
    /// Read a coordinate from a JSON value; empty strings are rejected
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n.as_f64().map(Coordinate::Number),
            serde_json::Value::String(s) if !s.trim().is_empty() => {
                Some(Coordinate::Text(s.trim().to_string()))
            }
            _ => None,
        }
    }

    /// Numeric view, if the coordinate parses
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Coordinate::Number(n) => Some(*n),
            Coordinate::Text(s) => s.parse().ok(),
        }
    }
}

/// Stop detail; the provider-scoped stop id is the key of the enclosing map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    /// Provider-assigned stop id
    #[serde(skip)]
    pub stop_id: String,
    /// Stop name (English)
    #[serde(rename = "name_en")]
    pub name: String,
    /// Latitude
    #[serde(rename = "lat")]
    pub latitude: Coordinate,
    /// Longitude
    #[serde(rename = "long")]
    pub longitude: Coordinate,
}

/// One position in a route's ordered stop list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteStop {
    /// Provider-scoped stop id
    pub stop_id: String,
    /// Provider-native sequence number
    pub seq: u32,
}

/// One fare-table row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FareEntry {
    /// Public route number
    #[serde(rename = "route")]
    pub route_id: String,
    /// Origin name (English)
    #[serde(rename = "orig_en")]
    pub origin_name: String,
    /// Destination name (English)
    #[serde(rename = "dest_en")]
    pub destination_name: String,
    /// Full adult fare in HKD
    #[serde(with = "rust_decimal::serde::float")]
    pub full_fare: Decimal,
    /// Provider the fare belongs to
    pub provider: Provider,
    /// Boarding stop sequence the fare applies from
    pub seq: u32,
    /// Direction derived from the feed's route sequence
    pub bound: Bound,
}
