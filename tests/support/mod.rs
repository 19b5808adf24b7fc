//! Shared mocks for the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use transit_harvester::fetcher::endpoints::Endpoints;
use transit_harvester::fetcher::transport::{RawResponse, Transport, TransportError};
use transit_harvester::fetcher::{FetchError, FetchResult, Fetcher, SharedFetcher};

/// Base URL every mock endpoint hangs off
pub const MOCK_BASE: &str = "http://mock";

/// Endpoints pointing at [`MOCK_BASE`]
pub fn mock_endpoints() -> Endpoints {
    Endpoints::with_base(MOCK_BASE)
}

/// Fetcher serving canned JSON per URL and counting calls per URL.
///
/// Unknown URLs fail like a 404.
#[derive(Default)]
pub struct MockFetcher {
    responses: HashMap<String, Value>,
    failing: HashMap<String, u16>,
    stalled: HashSet<String>,
    in_flight: Arc<AtomicUsize>,
    calls: Mutex<HashMap<String, usize>>,
}

/// Counts a stalled request until its future is dropped
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for `url`
    pub fn with(mut self, url: impl Into<String>, body: Value) -> Self {
        self.responses.insert(url.into(), body);
        self
    }

    /// Fail `url` with `status`
    pub fn failing(mut self, url: impl Into<String>, status: u16) -> Self {
        self.failing.insert(url.into(), status);
        self
    }

    /// Never answer `url`
    pub fn stalling(mut self, url: impl Into<String>) -> Self {
        self.stalled.insert(url.into());
        self
    }

    /// Stalled requests whose futures are still alive
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Calls made for `url`
    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    /// Calls made for URLs starting with `prefix`
    pub fn calls_with_prefix(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(url, _)| url.starts_with(prefix))
            .map(|(_, count)| count)
            .sum()
    }

    /// Every URL requested more than once
    pub fn repeated_urls(&self) -> Vec<String> {
        let mut urls: Vec<_> = self
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, count)| **count > 1)
            .map(|(url, _)| url.clone())
            .collect();
        urls.sort();
        urls
    }

    pub fn shared(self) -> (Arc<MockFetcher>, SharedFetcher) {
        let mock = Arc::new(self);
        let shared: SharedFetcher = mock.clone();
        (mock, shared)
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> FetchResult<Value> {
        *self.calls.lock().unwrap().entry(url.to_string()).or_default() += 1;

        // Yield so fan-out jobs interleave the way real requests do
        tokio::task::yield_now().await;

        if self.stalled.contains(url) {
            let _guard = InFlight::enter(&self.in_flight);
            std::future::pending::<()>().await;
        }
        if let Some(status) = self.failing.get(url) {
            return Err(FetchError::ClientError {
                url: url.to_string(),
                status: *status,
            });
        }
        self.responses
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::ClientError {
                url: url.to_string(),
                status: 404,
            })
    }
}

/// Transport replaying a script of responses; the last one repeats forever
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<RawResponse, TransportError>>>,
    last: Mutex<Option<Result<RawResponse, TransportError>>>,
    calls: AtomicU32,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Result<RawResponse, TransportError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            calls: AtomicU32::new(0),
        })
    }

    /// Always answer with `status` and `body`
    pub fn always(status: u16, body: &str) -> Arc<Self> {
        Self::new(vec![Ok(RawResponse::new(status, body))])
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, _url: &str) -> Result<RawResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        if let Some(response) = next {
            *last = Some(response);
        }
        last.clone()
            .unwrap_or_else(|| Err(TransportError::Other("empty script".to_string())))
    }
}

fn url(path: &str) -> String {
    format!("{MOCK_BASE}{path}")
}

/// A small but complete upstream: two KMB directions, two Citybus routes
/// sharing stops, one minibus route with two sequences, both fare feeds.
pub fn network() -> MockFetcher {
    MockFetcher::new()
        // KMB
        .with(url("/kmb/route/"), json!({"data": [
            {"route": "1A", "bound": "O", "service_type": "1", "orig_en": "STAR FERRY", "dest_en": "CHUK YUEN ESTATE"},
            {"route": "1A", "bound": "O", "service_type": "2", "orig_en": "STAR FERRY", "dest_en": "SAU MAU PING"},
            {"route": "1A", "bound": "I", "service_type": "1", "orig_en": "CHUK YUEN ESTATE", "dest_en": "STAR FERRY"}
        ]}))
        .with(url("/kmb/stop"), json!({"data": [
            {"stop": "K1", "name_en": "STAR FERRY", "lat": "22.293", "long": "114.168"},
            {"stop": "K2", "name_en": "CHUK YUEN ESTATE", "lat": "22.345", "long": "114.192"}
        ]}))
        .with(url("/kmb/route-stop"), json!({"data": [
            {"route": "1A", "bound": "O", "service_type": "1", "seq": "2", "stop": "K2"},
            {"route": "1A", "bound": "O", "service_type": "1", "seq": "1", "stop": "K1"},
            {"route": "1A", "bound": "O", "service_type": "2", "seq": "1", "stop": "K1"},
            {"route": "1A", "bound": "I", "service_type": "1", "seq": "1", "stop": "K2"},
            {"route": "1A", "bound": "I", "service_type": "1", "seq": "2", "stop": "K1"}
        ]}))
        // Citybus
        .with(url("/ctb/route/CTB"), json!({"data": [
            {"co": "CTB", "route": "1", "orig_en": "Central", "dest_en": "Happy Valley"},
            {"co": "CTB", "route": "2", "orig_en": "Grand Promenade", "dest_en": "Central"}
        ]}))
        .with(url("/ctb/route-stop/CTB/1/outbound"), json!({"data": [
            {"stop": "001", "seq": 1},
            {"stop": "002", "seq": 2}
        ]}))
        .with(url("/ctb/route-stop/CTB/1/inbound"), json!({"data": [
            {"stop": "002", "seq": 1}
        ]}))
        .with(url("/ctb/route-stop/CTB/2/outbound"), json!({"data": [
            {"stop": "002", "seq": "10"},
            {"stop": "003", "seq": "9"}
        ]}))
        .with(url("/ctb/stop/001"), json!({"data": {"stop": "001", "name_en": "Central (Exchange Square)", "lat": "22.283", "long": "114.158"}}))
        .with(url("/ctb/stop/002"), json!({"data": {"stop": "002", "name_tc": "金鐘", "lat": "22.279", "long": "114.165"}}))
        .with(url("/ctb/stop/003"), json!({"data": {"stop": "003", "name_en": "No coordinates"}}))
        // Green minibus
        .with(url("/gmb/route"), json!({"data": {"routes": {"KLN": ["24M"], "NT": ["101"]}}}))
        .with(url("/gmb/route/KLN/24M"), json!({"data": [{
            "route_id": 2004806,
            "directions": [
                {"route_seq": 1, "orig_en": "Kwun Tong", "dest_en": "Tsui Ping"},
                {"route_seq": 2, "orig_en": "Tsui Ping", "dest_en": "Kwun Tong"}
            ]
        }]}))
        .with(url("/gmb/route-stop/2004806/1"), json!({"data": {"route_stops": [
            {"stop_id": 20003338, "stop_seq": 2},
            {"stop_id": 20003337, "stop_seq": 1, "name_en": "Kwun Tong"}
        ]}}))
        .with(url("/gmb/route-stop/2004806/2"), json!({"data": {"route_stops": [
            {"stop_id": 20003338, "stop_seq": 1, "name_en": "Tsui Ping"},
            {"stop_id": 20003337, "stop_seq": 2, "name_en": "Kwun Tong Station"}
        ]}}))
        .with(url("/gmb/stop/20003337"), json!({"data": {"coordinates": {"wgs84": {"latitude": 22.3122, "longitude": 114.2258}}}}))
        .with(url("/gmb/stop/20003338"), json!({"data": {"coordinates": {"wgs84": {"latitude": 22.3247, "longitude": 114.2339}}}}))
        // Fares
        .with(url("/fares/JSON_BUS.json"), json!({"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {"companyCode": "KMB", "routeNameE": "1A", "routeSeq": 1, "stopSeq": 1,
                "fullFare": 6.4, "locStartNameE": "STAR FERRY", "locEndNameE": "CHUK YUEN ESTATE"}},
            {"type": "Feature", "properties": {"companyCode": "KMB", "routeNameE": "1A", "routeSeq": 2, "stopSeq": 1,
                "fullFare": "6.4", "locStartNameE": "CHUK YUEN ESTATE", "locEndNameE": "STAR FERRY"}},
            {"type": "Feature", "properties": {"companyCode": "CTB", "routeNameE": "1", "routeSeq": 1, "stopSeq": 3,
                "fullFare": 4.9}},
            {"type": "Feature", "properties": {"companyCode": "KMB+CTB", "routeNameE": "101", "routeSeq": 1, "stopSeq": 1,
                "fullFare": 12.8}},
            {"type": "Feature", "properties": {"companyCode": "NLB", "routeNameE": "3M", "routeSeq": 1, "stopSeq": 1,
                "fullFare": 11.1}}
        ]}))
        .with(url("/fares/JSON_GMB.json"), json!({"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {"companyCode": "GMB", "routeNameE": "24M", "routeSeq": 1, "stopSeq": 1,
                "fullFare": 7.6, "locStartNameE": "Kwun Tong", "locEndNameE": "Tsui Ping"}},
            {"type": "Feature", "properties": {"companyCode": "GMB", "routeNameE": "24M", "stopSeq": 2}}
        ]}))
}
