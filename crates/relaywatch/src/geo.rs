use std::collections::HashMap;
use std::net::{IpAddr, ToSocketAddrs};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::bounded;
use relaywire::NormRelayUrl;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::ratelimit::{RateLimiter, GEO_RATE_LIMITER};

/// Country code reported for relays on anonymity networks, where an IP
/// lookup would be meaningless.
pub const ANONYMITY_COUNTRY: &str = "XX";

/// Where a relay lives, legally and physically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JurisdictionInfo {
    pub ip: String,
    /// ISO-3166-1 alpha-2, or `XX` for anonymity networks
    pub country_code: String,
    pub region: Option<String>,
    pub city: Option<String>,
    pub asn: Option<String>,
    pub as_org: Option<String>,
    pub is_hosting: bool,
    pub is_tor: bool,
}

impl JurisdictionInfo {
    fn anonymity_network(is_tor: bool) -> Self {
        JurisdictionInfo {
            ip: String::new(),
            country_code: ANONYMITY_COUNTRY.to_string(),
            region: None,
            city: None,
            asn: None,
            as_org: None,
            is_hosting: false,
            is_tor,
        }
    }
}

/// Wire shape of the geolocation API response.
#[derive(Debug, Deserialize)]
struct GeoApiResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "countryCode")]
    country_code: Option<String>,
    #[serde(default, rename = "regionName")]
    region: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default, rename = "as")]
    asn: Option<String>,
    #[serde(default)]
    org: Option<String>,
    #[serde(default)]
    hosting: bool,
    #[serde(default)]
    proxy: bool,
}

fn info_from_response(ip: &IpAddr, response: GeoApiResponse) -> Result<JurisdictionInfo> {
    if response.status != "success" {
        return Err(Error::Geo(
            response
                .message
                .unwrap_or_else(|| "lookup failed".to_string()),
        ));
    }

    Ok(JurisdictionInfo {
        ip: ip.to_string(),
        country_code: response
            .country_code
            .unwrap_or_else(|| ANONYMITY_COUNTRY.to_string()),
        region: response.region,
        city: response.city,
        asn: response.asn,
        as_org: response.org,
        is_hosting: response.hosting,
        is_tor: response.proxy,
    })
}

struct CacheEntry {
    info: JurisdictionInfo,
    fetched: Instant,
}

/// Resolves relay hosts to jurisdictions through a rate-limited external
/// API, with a TTL cache in front of it.
pub struct GeoResolver {
    endpoint: String,
    limiter: Arc<RateLimiter>,
    cache: Mutex<HashMap<String, CacheEntry>>,
    pub cache_ttl: Duration,
    pub timeout: Duration,
    /// Gap between consecutive API calls in a batch, on top of the
    /// limiter itself.
    pub batch_gap: Duration,
}

impl Default for GeoResolver {
    fn default() -> Self {
        GeoResolver::new(GEO_RATE_LIMITER.clone())
    }
}

impl GeoResolver {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        GeoResolver {
            endpoint: "http://ip-api.com/json".to_string(),
            limiter,
            cache: Mutex::new(HashMap::new()),
            cache_ttl: Duration::from_secs(24 * 3600),
            timeout: Duration::from_secs(10),
            batch_gap: Duration::from_millis(1300),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn cached(&self, host: &str) -> Option<JurisdictionInfo> {
        let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache
            .get(host)
            .filter(|entry| entry.fetched.elapsed() < self.cache_ttl)
            .map(|entry| entry.info.clone())
    }

    /// Resolve one relay. Anonymity-network hosts never touch the API.
    pub fn resolve(&self, url: &NormRelayUrl) -> Result<JurisdictionInfo> {
        let host = url.host().to_string();

        if host.ends_with(".onion") {
            return Ok(JurisdictionInfo::anonymity_network(true));
        }
        if host.ends_with(".i2p") {
            return Ok(JurisdictionInfo::anonymity_network(false));
        }

        if let Some(info) = self.cached(&host) {
            return Ok(info);
        }

        let ip = resolve_ip(&host, url.port())?;
        let info = self.lookup_ip(&ip)?;

        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.insert(
            host,
            CacheEntry {
                info: info.clone(),
                fetched: Instant::now(),
            },
        );
        Ok(info)
    }

    fn lookup_ip(&self, ip: &IpAddr) -> Result<JurisdictionInfo> {
        self.limiter.acquire();

        let request_url = format!("{}/{}", self.endpoint, ip);
        debug!("geolocation lookup {}", request_url);

        let (tx, rx) = bounded(1);
        ehttp::fetch(ehttp::Request::get(&request_url), move |response| {
            let _ = tx.send(response);
        });

        let response = rx
            .recv_timeout(self.timeout)
            .map_err(|_| Error::Geo("lookup timeout".to_string()))?
            .map_err(Error::Geo)?;

        if !response.ok {
            return Err(Error::Geo(format!("http status {}", response.status)));
        }

        let parsed: GeoApiResponse = serde_json::from_slice(&response.bytes)?;
        info_from_response(ip, parsed)
    }

    /// Resolve a batch sequentially with a gap between API calls. Cache
    /// hits and anonymity hosts don't consume a gap slot.
    pub fn resolve_batch(
        &self,
        urls: &[NormRelayUrl],
    ) -> Vec<(NormRelayUrl, Result<JurisdictionInfo>)> {
        let mut results = Vec::with_capacity(urls.len());
        let mut api_called = false;

        for url in urls {
            let host = url.host();
            let needs_api = !host.ends_with(".onion")
                && !host.ends_with(".i2p")
                && self.cached(host).is_none();

            if needs_api && api_called {
                std::thread::sleep(self.batch_gap);
            }
            api_called |= needs_api;

            results.push((url.clone(), self.resolve(url)));
        }

        results
    }
}

fn resolve_ip(host: &str, port: u16) -> Result<IpAddr> {
    // a literal IP skips DNS entirely
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }

    (host, port)
        .to_socket_addrs()
        .map_err(|e| Error::Geo(format!("dns lookup for {host} failed: {e}")))?
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| Error::Geo(format!("no address for {host}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn onion_hosts_skip_the_api() {
        let resolver = GeoResolver::new(Arc::new(RateLimiter::unlimited()))
            .with_endpoint("http://127.0.0.1:1/unreachable");
        let url = NormRelayUrl::parse("ws://relayabcdefghij.onion").unwrap();

        let info = resolver.resolve(&url).unwrap();
        assert_eq!(info.country_code, ANONYMITY_COUNTRY);
        assert!(info.is_tor);
    }

    #[test]
    fn i2p_hosts_are_anonymity_but_not_tor() {
        let resolver = GeoResolver::new(Arc::new(RateLimiter::unlimited()))
            .with_endpoint("http://127.0.0.1:1/unreachable");
        let url = NormRelayUrl::parse("ws://relay.i2p").unwrap();

        let info = resolver.resolve(&url).unwrap();
        assert_eq!(info.country_code, ANONYMITY_COUNTRY);
        assert!(!info.is_tor);
    }

    #[test]
    fn api_response_maps_to_jurisdiction() {
        let ip: IpAddr = "95.216.1.1".parse().unwrap();
        let response: GeoApiResponse = serde_json::from_str(
            r#"{
                "status": "success",
                "countryCode": "FI",
                "regionName": "Uusimaa",
                "city": "Helsinki",
                "as": "AS24940 Hetzner Online GmbH",
                "org": "Hetzner",
                "hosting": true,
                "proxy": false
            }"#,
        )
        .unwrap();

        let info = info_from_response(&ip, response).unwrap();
        assert_eq!(info.ip, "95.216.1.1");
        assert_eq!(info.country_code, "FI");
        assert_eq!(info.region.as_deref(), Some("Uusimaa"));
        assert!(info.is_hosting);
        assert!(!info.is_tor);
    }

    #[test]
    fn failed_lookup_is_an_error() {
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        let response: GeoApiResponse = serde_json::from_str(
            r#"{"status": "fail", "message": "private range"}"#,
        )
        .unwrap();
        match info_from_response(&ip, response) {
            Err(Error::Geo(msg)) => assert_eq!(msg, "private range"),
            other => panic!("expected geo error, got {other:?}"),
        }
    }

    #[test]
    fn literal_ip_skips_dns() {
        assert_eq!(
            resolve_ip("203.0.113.7", 443).unwrap().to_string(),
            "203.0.113.7"
        );
    }
}
