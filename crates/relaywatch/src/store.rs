use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use relaywire::{NormRelayUrl, Pubkey};
use serde::{Deserialize, Serialize};

use crate::assertion::AssertionStatus;
use crate::error::{Error, Result};
use crate::probe::ProbeResult;
use crate::score::Confidence;
use crate::telemetry::{MonitorStats, TelemetryMetric};

/// Latest round-trip readings one monitor has for one relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RttSample {
    pub open: Option<u32>,
    pub read: Option<u32>,
    pub write: Option<u32>,
    pub timestamp: u64,
}

impl RttSample {
    fn from_metric(metric: &TelemetryMetric) -> Self {
        RttSample {
            open: metric.rtt_open,
            read: metric.rtt_read,
            write: metric.rtt_write,
            timestamp: metric.timestamp,
        }
    }
}

/// One monitor's view, as needed for percentile ranking: its latest
/// sample for the subject relay plus its latest samples across everything
/// it tracks.
#[derive(Debug, Clone)]
pub struct MonitorView {
    pub monitor: Pubkey,
    pub tracked_relays: usize,
    pub latest: Option<RttSample>,
    pub latest_open_all: Vec<u32>,
    pub latest_read_all: Vec<u32>,
}

/// Aggregate telemetry about one relay, assembled fresh per scoring round
/// so monitor qualification is never stale.
#[derive(Debug, Clone, Default)]
pub struct TelemetryStats {
    pub event_count: u64,
    pub monitor_count: usize,
    pub first_seen: Option<u64>,
    pub monitors: Vec<MonitorView>,
}

/// Most recent successfully published assertion per relay, for
/// material-change detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedAssertionRecord {
    pub relay_url: NormRelayUrl,
    pub status: AssertionStatus,
    pub score: u8,
    pub reliability: u8,
    pub quality: Option<u8>,
    pub accessibility: Option<u8>,
    pub confidence: Confidence,
    pub event_id: String,
    pub published_at: u64,
}

/// The single source of mutable state shared across components. Safe for
/// concurrent callers; everything else talks to it through this interface.
pub trait DataStore: Send + Sync {
    /// Append one probe. Probes for a relay are kept in non-decreasing
    /// timestamp order using the provided timestamp.
    fn store_probe(&self, probe: ProbeResult) -> Result<()>;

    /// Store a telemetry metric, keyed by event id. Returns false when the
    /// event was already known.
    fn store_telemetry_metric(&self, metric: TelemetryMetric) -> Result<bool>;

    fn update_monitor_stats(&self, monitor: &Pubkey, seen_at: u64) -> Result<()>;

    fn set_monitor_frequency(&self, monitor: &Pubkey, frequency: u64) -> Result<()>;

    fn monitor_stats(&self, monitor: &Pubkey) -> Result<Option<MonitorStats>>;

    /// Probes for `url` no older than `window` before `now`.
    fn get_probes(&self, url: &NormRelayUrl, window: Duration, now: u64) -> Result<Vec<ProbeResult>>;

    fn get_telemetry_stats(&self, url: &NormRelayUrl) -> Result<TelemetryStats>;

    fn get_last_published_assertion(
        &self,
        url: &NormRelayUrl,
    ) -> Result<Option<PublishedAssertionRecord>>;

    /// Upsert: at most one record per relay.
    fn store_published_assertion(&self, record: PublishedAssertionRecord) -> Result<()>;
}

#[derive(Default)]
struct Inner {
    probes: HashMap<NormRelayUrl, Vec<ProbeResult>>,
    metric_ids: HashSet<String>,
    relay_first_seen: HashMap<NormRelayUrl, u64>,
    relay_event_count: HashMap<NormRelayUrl, u64>,
    /// monitor → relay → latest sample
    monitor_latest: HashMap<Pubkey, HashMap<NormRelayUrl, RttSample>>,
    monitors: HashMap<Pubkey, MonitorStats>,
    published: HashMap<NormRelayUrl, PublishedAssertionRecord>,
}

/// Mutex-guarded in-memory store. Backs the daemon and every test; a
/// durable implementation only has to fill in the same trait.
#[derive(Default)]
pub struct MemoryDataStore {
    inner: Mutex<Inner>,
}

impl MemoryDataStore {
    pub fn new() -> Self {
        MemoryDataStore::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| Error::Store("store mutex poisoned".to_string()))
    }
}

impl DataStore for MemoryDataStore {
    fn store_probe(&self, probe: ProbeResult) -> Result<()> {
        let mut inner = self.lock()?;
        let probes = inner.probes.entry(probe.url.clone()).or_default();

        // single-prober insertion is already ordered; a second prober's
        // out-of-order timestamp gets placed, not rejected
        let at = probes.partition_point(|p| p.timestamp <= probe.timestamp);
        probes.insert(at, probe);
        Ok(())
    }

    fn store_telemetry_metric(&self, metric: TelemetryMetric) -> Result<bool> {
        let mut inner = self.lock()?;
        if !inner.metric_ids.insert(metric.event_id.clone()) {
            return Ok(false);
        }

        inner
            .relay_first_seen
            .entry(metric.relay_url.clone())
            .and_modify(|first| *first = (*first).min(metric.timestamp))
            .or_insert(metric.timestamp);
        *inner
            .relay_event_count
            .entry(metric.relay_url.clone())
            .or_insert(0) += 1;

        let sample = RttSample::from_metric(&metric);
        let per_relay = inner.monitor_latest.entry(metric.monitor).or_default();
        match per_relay.get_mut(&metric.relay_url) {
            Some(existing) if existing.timestamp > sample.timestamp => {}
            Some(existing) => *existing = sample,
            None => {
                per_relay.insert(metric.relay_url.clone(), sample);
            }
        }

        Ok(true)
    }

    fn update_monitor_stats(&self, monitor: &Pubkey, seen_at: u64) -> Result<()> {
        let mut inner = self.lock()?;
        inner
            .monitors
            .entry(*monitor)
            .and_modify(|stats| {
                stats.last_seen = stats.last_seen.max(seen_at);
                stats.first_seen = stats.first_seen.min(seen_at);
                stats.event_count += 1;
            })
            .or_insert(MonitorStats {
                pubkey: *monitor,
                first_seen: seen_at,
                last_seen: seen_at,
                event_count: 1,
                announced_frequency: None,
            });
        Ok(())
    }

    fn set_monitor_frequency(&self, monitor: &Pubkey, frequency: u64) -> Result<()> {
        let mut inner = self.lock()?;
        if let Some(stats) = inner.monitors.get_mut(monitor) {
            stats.announced_frequency = Some(frequency);
        } else {
            inner.monitors.insert(
                *monitor,
                MonitorStats {
                    pubkey: *monitor,
                    first_seen: 0,
                    last_seen: 0,
                    event_count: 0,
                    announced_frequency: Some(frequency),
                },
            );
        }
        Ok(())
    }

    fn monitor_stats(&self, monitor: &Pubkey) -> Result<Option<MonitorStats>> {
        Ok(self.lock()?.monitors.get(monitor).cloned())
    }

    fn get_probes(
        &self,
        url: &NormRelayUrl,
        window: Duration,
        now: u64,
    ) -> Result<Vec<ProbeResult>> {
        let inner = self.lock()?;
        let cutoff = now.saturating_sub(window.as_secs());
        Ok(inner
            .probes
            .get(url)
            .map(|probes| {
                probes
                    .iter()
                    .filter(|p| p.timestamp >= cutoff)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn get_telemetry_stats(&self, url: &NormRelayUrl) -> Result<TelemetryStats> {
        let inner = self.lock()?;

        let mut monitors: Vec<MonitorView> = Vec::new();
        for (monitor, per_relay) in &inner.monitor_latest {
            let Some(latest) = per_relay.get(url) else {
                continue;
            };

            let mut latest_open_all: Vec<u32> = Vec::new();
            let mut latest_read_all: Vec<u32> = Vec::new();
            for sample in per_relay.values() {
                if let Some(open) = sample.open {
                    latest_open_all.push(open);
                }
                if let Some(read) = sample.read {
                    latest_read_all.push(read);
                }
            }

            monitors.push(MonitorView {
                monitor: *monitor,
                tracked_relays: per_relay.len(),
                latest: Some(*latest),
                latest_open_all,
                latest_read_all,
            });
        }
        monitors.sort_by(|a, b| a.monitor.cmp(&b.monitor));

        Ok(TelemetryStats {
            event_count: inner.relay_event_count.get(url).copied().unwrap_or(0),
            monitor_count: monitors.len(),
            first_seen: inner.relay_first_seen.get(url).copied(),
            monitors,
        })
    }

    fn get_last_published_assertion(
        &self,
        url: &NormRelayUrl,
    ) -> Result<Option<PublishedAssertionRecord>> {
        Ok(self.lock()?.published.get(url).cloned())
    }

    fn store_published_assertion(&self, record: PublishedAssertionRecord) -> Result<()> {
        let mut inner = self.lock()?;
        inner.published.insert(record.relay_url.clone(), record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{AccessLevel, RelayType};

    fn url(s: &str) -> NormRelayUrl {
        NormRelayUrl::parse(s).unwrap()
    }

    fn probe(u: &NormRelayUrl, ts: u64, reachable: bool) -> ProbeResult {
        ProbeResult {
            url: u.clone(),
            timestamp: ts,
            reachable,
            relay_type: RelayType::General,
            access_level: AccessLevel::Open,
            connect_time: reachable.then_some(100),
            nip11_fetch_time: None,
            read_time: None,
            write_time: None,
            nip11: None,
            closed_reason: None,
            error: None,
        }
    }

    fn metric(id: &str, relay: &NormRelayUrl, monitor: Pubkey, ts: u64, open: u32) -> TelemetryMetric {
        TelemetryMetric {
            event_id: id.to_string(),
            relay_url: relay.clone(),
            monitor,
            timestamp: ts,
            rtt_open: Some(open),
            rtt_read: Some(open / 2),
            rtt_write: None,
            network: None,
            supported_nips: vec![],
            geohash: None,
        }
    }

    #[test]
    fn probes_keep_timestamp_order() {
        let store = MemoryDataStore::new();
        let u = url("wss://relay.example.com");

        store.store_probe(probe(&u, 100, true)).unwrap();
        store.store_probe(probe(&u, 300, true)).unwrap();
        store.store_probe(probe(&u, 200, false)).unwrap();

        let probes = store
            .get_probes(&u, Duration::from_secs(3600), 400)
            .unwrap();
        let stamps: Vec<u64> = probes.iter().map(|p| p.timestamp).collect();
        assert_eq!(stamps, vec![100, 200, 300]);
    }

    #[test]
    fn probe_window_filters_old_rows() {
        let store = MemoryDataStore::new();
        let u = url("wss://relay.example.com");

        store.store_probe(probe(&u, 100, true)).unwrap();
        store.store_probe(probe(&u, 5000, true)).unwrap();

        let probes = store
            .get_probes(&u, Duration::from_secs(1000), 5500)
            .unwrap();
        assert_eq!(probes.len(), 1);
        assert_eq!(probes[0].timestamp, 5000);
    }

    #[test]
    fn duplicate_metric_ids_are_ignored() {
        let store = MemoryDataStore::new();
        let u = url("wss://relay.example.com");
        let monitor = Pubkey::new([1; 32]);

        assert!(store
            .store_telemetry_metric(metric("ev1", &u, monitor, 100, 120))
            .unwrap());
        assert!(!store
            .store_telemetry_metric(metric("ev1", &u, monitor, 200, 150))
            .unwrap());

        let stats = store.get_telemetry_stats(&u).unwrap();
        assert_eq!(stats.event_count, 1);
    }

    #[test]
    fn telemetry_stats_track_latest_per_monitor() {
        let store = MemoryDataStore::new();
        let u = url("wss://relay.example.com");
        let other = url("wss://other.example.com");
        let monitor = Pubkey::new([1; 32]);

        store
            .store_telemetry_metric(metric("ev1", &u, monitor, 100, 500))
            .unwrap();
        // newer reading replaces the latest sample
        store
            .store_telemetry_metric(metric("ev2", &u, monitor, 200, 120))
            .unwrap();
        // out-of-order older reading does not
        store
            .store_telemetry_metric(metric("ev3", &u, monitor, 150, 900))
            .unwrap();
        store
            .store_telemetry_metric(metric("ev4", &other, monitor, 100, 80))
            .unwrap();

        let stats = store.get_telemetry_stats(&u).unwrap();
        assert_eq!(stats.event_count, 3);
        assert_eq!(stats.monitor_count, 1);
        assert_eq!(stats.first_seen, Some(100));

        let view = &stats.monitors[0];
        assert_eq!(view.tracked_relays, 2);
        assert_eq!(view.latest.unwrap().open, Some(120));
        let mut opens = view.latest_open_all.clone();
        opens.sort_unstable();
        assert_eq!(opens, vec![80, 120]);
    }

    #[test]
    fn published_record_upserts() {
        let store = MemoryDataStore::new();
        let u = url("wss://relay.example.com");

        let mut record = PublishedAssertionRecord {
            relay_url: u.clone(),
            status: AssertionStatus::Evaluated,
            score: 70,
            reliability: 80,
            quality: Some(60),
            accessibility: None,
            confidence: Confidence::Medium,
            event_id: "e1".to_string(),
            published_at: 100,
        };
        store.store_published_assertion(record.clone()).unwrap();

        record.score = 75;
        record.event_id = "e2".to_string();
        store.store_published_assertion(record.clone()).unwrap();

        let loaded = store.get_last_published_assertion(&u).unwrap().unwrap();
        assert_eq!(loaded.score, 75);
        assert_eq!(loaded.event_id, "e2");
    }

    #[test]
    fn monitor_stats_accumulate() {
        let store = MemoryDataStore::new();
        let monitor = Pubkey::new([2; 32]);

        store.update_monitor_stats(&monitor, 100).unwrap();
        store.update_monitor_stats(&monitor, 300).unwrap();
        store.set_monitor_frequency(&monitor, 3600).unwrap();

        let stats = store.monitor_stats(&monitor).unwrap().unwrap();
        assert_eq!(stats.first_seen, 100);
        assert_eq!(stats.last_seen, 300);
        assert_eq!(stats.event_count, 2);
        assert_eq!(stats.announced_frequency, Some(3600));
    }
}
