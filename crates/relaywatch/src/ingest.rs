use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use relaywire::{
    verify_event_json, Event, Filter, NormRelayUrl, Pubkey, RelayEvent, RelayMessage, RelayPool,
    SubId,
};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::store::DataStore;
use crate::telemetry::TelemetryMetric;
use crate::{MONITOR_ANNOUNCEMENT_KIND, TELEMETRY_KIND};

/// Fire-and-forget notifications about ingest progress. Senders never
/// block; a slow observer just queues.
#[derive(Debug, Clone)]
pub enum IngestNotification {
    Metric {
        relay_url: NormRelayUrl,
        monitor: Pubkey,
    },
    MonitorDiscovered {
        monitor: Pubkey,
        frequency: Option<u64>,
    },
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub source_relays: Vec<String>,
    /// Empty set means every monitor is accepted.
    pub trusted_monitors: HashSet<Pubkey>,
    /// Backfill depth requested from each source relay.
    pub initial_limit: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            source_relays: vec![],
            trusted_monitors: HashSet::new(),
            initial_limit: 1000,
        }
    }
}

/// Long-running consumer of kind-30166 telemetry feeds on the configured
/// source relays. Verifies, filters, parses, stores; connection drops are
/// handled by the pool's backoff, parse failures are dropped quietly.
pub struct MonitorIngestor {
    config: IngestConfig,
    pool: RelayPool,
    store: Arc<dyn DataStore>,
    sub: SubId,
    shutdown: Arc<AtomicBool>,
    notify: Option<Sender<IngestNotification>>,
    accepted: u64,
    dropped: u64,
}

impl MonitorIngestor {
    pub fn new(config: IngestConfig, store: Arc<dyn DataStore>) -> Self {
        MonitorIngestor {
            config,
            pool: RelayPool::new(),
            store,
            sub: SubId::new("telemetry"),
            shutdown: Arc::new(AtomicBool::new(false)),
            notify: None,
            accepted: 0,
            dropped: 0,
        }
    }

    /// Flag observed by [`run`]; flip it from any thread to stop.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Subscribe an observer. Must be called before [`start`].
    pub fn notifications(&mut self) -> Receiver<IngestNotification> {
        let (tx, rx) = unbounded();
        self.notify = Some(tx);
        rx
    }

    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn telemetry_filter(&self) -> Filter {
        let mut filter = Filter::new()
            .kinds(vec![TELEMETRY_KIND])
            .limit(self.config.initial_limit);
        if !self.config.trusted_monitors.is_empty() {
            let mut authors: Vec<String> = self
                .config
                .trusted_monitors
                .iter()
                .map(|pk| pk.hex())
                .collect();
            authors.sort();
            filter = filter.authors(authors);
        }
        filter
    }

    /// Open connections to every source relay and subscribe. The
    /// subscription is re-sent automatically after every reconnect.
    pub fn start(&mut self) -> Result<()> {
        for url in self.config.source_relays.clone() {
            if let Err(err) = self.pool.add_url(&url, || {}) {
                warn!("skipping source relay {}: {}", url, err);
            }
        }

        let filter = self.telemetry_filter();
        self.pool
            .subscribe(self.sub.as_str().to_owned(), vec![filter]);
        info!(
            sources = self.pool.relays.len(),
            trusted = self.config.trusted_monitors.len(),
            "telemetry ingest started"
        );
        Ok(())
    }

    /// Drive until the shutdown flag flips, then close subscriptions.
    pub fn run(&mut self) {
        while !self.shutdown.load(Ordering::Relaxed) {
            self.drive();
            self.pool.tick(|| {});
            std::thread::sleep(Duration::from_millis(20));
        }
        self.stop();
    }

    /// One poll pass over all source connections.
    pub fn drive(&mut self) {
        while let Some(pool_event) = self.pool.try_recv() {
            let relay = pool_event.relay.clone();
            match RelayEvent::from(&pool_event.event) {
                RelayEvent::Message(RelayMessage::Event { event_json, .. }) => {
                    self.ingest_event_json(&event_json);
                }
                RelayEvent::Message(RelayMessage::Eose(_)) => {
                    debug!("eose from {}", relay);
                }
                RelayEvent::Message(RelayMessage::Notice(notice)) => {
                    info!("notice from {}: {}", relay, notice);
                }
                RelayEvent::Message(RelayMessage::Closed { reason, .. }) => {
                    warn!("subscription closed by {}: {}", relay, reason);
                }
                RelayEvent::Message(RelayMessage::Ok(_)) => {}
                RelayEvent::Opened => debug!("source {} connected", relay),
                RelayEvent::Closed => debug!("source {} disconnected", relay),
                RelayEvent::Error(err) => debug!("source {} error: {}", relay, err),
                RelayEvent::Other => {}
            }
        }
    }

    /// Verify, filter and store one incoming event. Anything malformed is
    /// counted and dropped, never fatal.
    pub fn ingest_event_json(&mut self, event_json: &str) {
        if verify_event_json(event_json).is_err() {
            debug!("dropping event with bad signature");
            self.dropped += 1;
            return;
        }

        let event = match Event::from_json(event_json) {
            Ok(event) => event,
            Err(err) => {
                debug!("dropping unparseable event: {}", err);
                self.dropped += 1;
                return;
            }
        };

        if !self.config.trusted_monitors.is_empty()
            && !self.config.trusted_monitors.contains(&event.pubkey)
        {
            debug!("dropping event from untrusted monitor {}", event.pubkey);
            self.dropped += 1;
            return;
        }

        match event.kind {
            TELEMETRY_KIND => self.ingest_telemetry(&event),
            MONITOR_ANNOUNCEMENT_KIND => self.ingest_announcement(&event),
            other => {
                debug!("ignoring event of kind {}", other);
                self.dropped += 1;
            }
        }
    }

    fn ingest_telemetry(&mut self, event: &Event) {
        let metric = match TelemetryMetric::from_event(event) {
            Ok(metric) => metric,
            Err(err) => {
                debug!("discarding telemetry event: {}", err);
                self.dropped += 1;
                return;
            }
        };

        let relay_url = metric.relay_url.clone();
        let monitor = metric.monitor;
        let seen_at = metric.timestamp;

        let fresh = match self.store.store_telemetry_metric(metric) {
            Ok(fresh) => fresh,
            Err(err) => {
                warn!("failed to store telemetry metric: {}", err);
                return;
            }
        };

        if let Err(err) = self.store.update_monitor_stats(&monitor, seen_at) {
            warn!("failed to update monitor stats: {}", err);
        }

        if fresh {
            self.accepted += 1;
            self.emit(IngestNotification::Metric { relay_url, monitor });
        }
    }

    fn ingest_announcement(&mut self, event: &Event) {
        let frequency = event
            .tag_value("frequency")
            .and_then(|v| v.parse::<u64>().ok());

        if let Some(frequency) = frequency {
            if let Err(err) = self.store.set_monitor_frequency(&event.pubkey, frequency) {
                warn!("failed to store monitor frequency: {}", err);
            }
        }

        self.emit(IngestNotification::MonitorDiscovered {
            monitor: event.pubkey,
            frequency,
        });
    }

    fn emit(&self, notification: IngestNotification) {
        if let Some(tx) = &self.notify {
            let _ = tx.send(notification);
        }
    }

    /// Time-bounded discovery pass for kind-10166 monitor announcements.
    pub fn discover_monitors(&mut self, window: Duration) {
        let sub = SubId::new("monitor-discovery");
        self.pool.subscribe(
            sub.as_str().to_owned(),
            vec![Filter::new()
                .kinds(vec![MONITOR_ANNOUNCEMENT_KIND])
                .limit(100)],
        );

        let deadline = Instant::now() + window;
        while Instant::now() < deadline && !self.shutdown.load(Ordering::Relaxed) {
            self.drive();
            self.pool.tick(|| {});
            std::thread::sleep(Duration::from_millis(20));
        }

        self.pool.unsubscribe(sub.as_str());
    }

    /// Close the subscription everywhere, drop the sockets, clear
    /// bookkeeping. The ingestor can be started again afterwards.
    pub fn stop(&mut self) {
        self.pool.unsubscribe(self.sub.as_str());
        self.pool.relays.clear();
        info!(
            accepted = self.accepted,
            dropped = self.dropped,
            "telemetry ingest stopped"
        );
    }
}
