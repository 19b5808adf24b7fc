//! Upstream URL templates

/// KMB open data API base
pub const KMB_BASE_URL: &str = "https://data.etabus.gov.hk/v1/transport/kmb";
/// Citybus open data API base
pub const CTB_BASE_URL: &str = "https://rt.data.gov.hk/v2/transport/citybus";
/// Green minibus open data API base
pub const MINIBUS_BASE_URL: &str = "https://data.etagmb.gov.hk";
/// Transport Department routes-and-fares GeoJSON base
pub const FARES_BASE_URL: &str = "https://static.data.gov.hk/td/routes-fares-geojson";

/// Base URLs of every upstream API.
///
/// Tests point these at mock hosts; production uses [`Endpoints::default`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// KMB base
    pub kmb_base: String,
    /// Citybus base
    pub ctb_base: String,
    /// Minibus base
    pub minibus_base: String,
    /// Fare feed base
    pub fares_base: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            kmb_base: KMB_BASE_URL.to_string(),
            ctb_base: CTB_BASE_URL.to_string(),
            minibus_base: MINIBUS_BASE_URL.to_string(),
            fares_base: FARES_BASE_URL.to_string(),
        }
    }
}

impl Endpoints {
    /// Point every provider at one host, e.g. `http://mock` in tests
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            kmb_base: format!("{base}/kmb"),
            ctb_base: format!("{base}/ctb"),
            minibus_base: format!("{base}/gmb"),
            fares_base: format!("{base}/fares"),
        }
    }

    /// KMB route list
    pub fn kmb_routes(&self) -> String {
        format!("{}/route/", self.kmb_base)
    }

    /// KMB bulk stop list
    pub fn kmb_stops(&self) -> String {
        format!("{}/stop", self.kmb_base)
    }

    /// KMB bulk route-stop list
    pub fn kmb_route_stops(&self) -> String {
        format!("{}/route-stop", self.kmb_base)
    }

    /// Citybus route list
    pub fn ctb_routes(&self) -> String {
        format!("{}/route/CTB", self.ctb_base)
    }

    /// Citybus ordered stop list for one route direction (`outbound`/`inbound`)
    pub fn ctb_route_stops(&self, route: &str, direction: &str) -> String {
        format!("{}/route-stop/CTB/{route}/{direction}", self.ctb_base)
    }

    /// Citybus stop detail
    pub fn ctb_stop(&self, stop_id: &str) -> String {
        format!("{}/stop/{stop_id}", self.ctb_base)
    }

    /// Minibus region -> route list index
    pub fn minibus_routes(&self) -> String {
        format!("{}/route", self.minibus_base)
    }

    /// Minibus route detail with its directions
    pub fn minibus_route(&self, region: &str, route: &str) -> String {
        format!("{}/route/{region}/{route}", self.minibus_base)
    }

    /// Minibus ordered stop list for a route id and route sequence
    pub fn minibus_route_stops(&self, route_id: &str, route_seq: &str) -> String {
        format!("{}/route-stop/{route_id}/{route_seq}", self.minibus_base)
    }

    /// Minibus stop detail
    pub fn minibus_stop(&self, stop_id: &str) -> String {
        format!("{}/stop/{stop_id}", self.minibus_base)
    }

    /// Franchised bus fare feed
    pub fn bus_fares(&self) -> String {
        format!("{}/JSON_BUS.json", self.fares_base)
    }

    /// Green minibus fare feed
    pub fn minibus_fares(&self) -> String {
        format!("{}/JSON_GMB.json", self.fares_base)
    }
}
