use crate::relay::message::RelayMessage;
use crate::relay::RelayStatus;
use crate::{ClientMessage, Error, Event, Filter, NormRelayUrl, WebsocketConn};

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::time::{Duration, Instant};

use ewebsock::{WsEvent, WsMessage};
use tracing::{debug, error, warn};

const MAX_RECONNECT_BACKOFF: Duration = Duration::from_secs(60);

pub struct PoolRelay {
    pub conn: WebsocketConn,
    pub last_ping: Instant,
    pub last_connect_attempt: Instant,
    pub retry_connect_after: Duration,
    /// Consecutive reconnect attempts since the last successful open.
    pub reconnect_attempt: u32,
}

impl PoolRelay {
    pub fn new(conn: WebsocketConn) -> PoolRelay {
        PoolRelay {
            conn,
            last_ping: Instant::now(),
            last_connect_attempt: Instant::now(),
            retry_connect_after: Self::initial_reconnect_duration(),
            reconnect_attempt: 0,
        }
    }

    pub fn initial_reconnect_duration() -> Duration {
        Duration::from_secs(1)
    }
}

/// An event from some relay in the pool, owned so callers can hold on to
/// it across further pool polls.
#[derive(Debug)]
pub struct PoolEvent {
    pub relay: NormRelayUrl,
    pub event: WsEvent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayPublishResult {
    pub relay: String,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PublishOutcome {
    pub results: Vec<RelayPublishResult>,
    pub success_count: usize,
}

impl PublishOutcome {
    /// True when at least one destination accepted the event.
    pub fn accepted(&self) -> bool {
        self.success_count > 0
    }
}

struct PendingPublish {
    deadline: Instant,
    /// None while the destination hasn't reported.
    waiting: HashMap<NormRelayUrl, Option<RelayPublishResult>>,
}

/// Multiplexes a small number of outbound websocket connections: at most
/// one socket per destination, reconnects with exponential backoff, resends
/// active subscriptions after reconnect, and tracks in-flight publishes so
/// the same event is never sent twice concurrently.
pub struct RelayPool {
    pub relays: Vec<PoolRelay>,
    pub ping_rate: Duration,
    pub publish_timeout: Duration,
    in_flight: HashMap<String, PendingPublish>,
    backlog: VecDeque<PoolEvent>,
    subs: HashMap<String, Vec<Filter>>,
}

impl Default for RelayPool {
    fn default() -> Self {
        RelayPool::new()
    }
}

impl RelayPool {
    pub fn new() -> RelayPool {
        RelayPool {
            relays: vec![],
            ping_rate: Duration::from_secs(25),
            publish_timeout: Duration::from_secs(10),
            in_flight: HashMap::new(),
            backlog: VecDeque::new(),
            subs: HashMap::new(),
        }
    }

    pub fn publish_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.publish_timeout = timeout;
        self
    }

    pub fn has(&self, url: &NormRelayUrl) -> bool {
        self.relays.iter().any(|r| &r.conn.url == url)
    }

    pub fn urls(&self) -> BTreeSet<String> {
        self.relays
            .iter()
            .map(|r| r.conn.url.as_str().to_owned())
            .collect()
    }

    /// Add a destination, normalizing the URL first. A destination that is
    /// already in the pool keeps its existing socket.
    pub fn add_url(
        &mut self,
        url: &str,
        wakeup: impl Fn() + Send + Sync + Clone + 'static,
    ) -> Result<(), Error> {
        let url = NormRelayUrl::parse(url)?;
        if self.has(&url) {
            return Ok(());
        }
        let conn = WebsocketConn::new(url, wakeup)?;
        self.relays.push(PoolRelay::new(conn));
        Ok(())
    }

    /// Open a connection outside the pooled set, for one-shot measurement
    /// probes. The pool stays the only place sockets are created.
    pub fn ephemeral(
        url: NormRelayUrl,
        wakeup: impl Fn() + Send + Sync + 'static,
    ) -> Result<WebsocketConn, Error> {
        WebsocketConn::new(url, wakeup)
    }

    /// Subscribe on every destination. The subscription is remembered and
    /// re-sent whenever a connection reopens.
    pub fn subscribe(&mut self, sub_id: String, filters: Vec<Filter>) {
        for relay in &mut self.relays {
            if relay.conn.is_connected() {
                relay
                    .conn
                    .send(&ClientMessage::req(sub_id.clone(), filters.clone()));
            }
        }
        self.subs.insert(sub_id, filters);
    }

    pub fn unsubscribe(&mut self, sub_id: &str) {
        self.subs.remove(sub_id);
        for relay in &mut self.relays {
            if relay.conn.is_connected() {
                relay.conn.send(&ClientMessage::close(sub_id.to_owned()));
            }
        }
    }

    /// Reconnect/keepalive pass. Call this regularly from the drive loop.
    pub fn tick(&mut self, wakeup: impl Fn() + Send + Sync + Clone + 'static) {
        for relay in &mut self.relays {
            let now = Instant::now();

            match relay.conn.status {
                RelayStatus::Disconnected => {
                    let reconnect_at = relay.last_connect_attempt + relay.retry_connect_after;
                    if now > reconnect_at {
                        relay.last_connect_attempt = now;
                        relay.reconnect_attempt = relay.reconnect_attempt.saturating_add(1);
                        let shift = relay.reconnect_attempt.min(6);
                        let next = Duration::from_secs(1u64 << shift).min(MAX_RECONNECT_BACKOFF);
                        debug!(
                            "reconnecting {} (attempt {}), next retry in {:?}",
                            relay.conn.url, relay.reconnect_attempt, next
                        );
                        relay.retry_connect_after = next;
                        if let Err(err) = relay.conn.reconnect(wakeup.clone()) {
                            error!("error reconnecting to {}: {}", relay.conn.url, err);
                        }
                    }
                }

                RelayStatus::Connected => {
                    if now - relay.last_ping > self.ping_rate {
                        relay.conn.ping();
                        relay.last_ping = now;
                    }
                }

                RelayStatus::Connecting => {}
            }
        }
    }

    /// Receive the next pool event. OK frames that settle an in-flight
    /// publish are absorbed here and never surface to the caller.
    pub fn try_recv(&mut self) -> Option<PoolEvent> {
        if let Some(ev) = self.backlog.pop_front() {
            return Some(ev);
        }
        self.poll_sockets()
    }

    fn poll_sockets(&mut self) -> Option<PoolEvent> {
        for idx in 0..self.relays.len() {
            loop {
                let url = self.relays[idx].conn.url.clone();
                let Some(event) = self.relays[idx].conn.try_recv() else {
                    break;
                };

                match &event {
                    WsEvent::Opened => self.on_opened(idx),
                    WsEvent::Closed | WsEvent::Error(_) => self.on_lost(&url),
                    WsEvent::Message(_) => {}
                }

                if self.absorb_publish_ok(&url, &event) {
                    continue;
                }

                return Some(PoolEvent { relay: url, event });
            }
        }

        None
    }

    fn on_opened(&mut self, idx: usize) {
        let relay = &mut self.relays[idx];
        relay.retry_connect_after = PoolRelay::initial_reconnect_duration();
        relay.reconnect_attempt = 0;
        debug!("connected to {}", relay.conn.url);

        for (sub_id, filters) in &self.subs {
            self.relays[idx]
                .conn
                .send(&ClientMessage::req(sub_id.clone(), filters.clone()));
        }
    }

    /// A destination dropped mid-publish: settle its slot so the publish
    /// doesn't wait out the full timeout on a dead socket.
    fn on_lost(&mut self, url: &NormRelayUrl) {
        for pending in self.in_flight.values_mut() {
            if let Some(slot) = pending.waiting.get_mut(url) {
                if slot.is_none() {
                    *slot = Some(RelayPublishResult {
                        relay: url.as_str().to_owned(),
                        success: false,
                        error: Some("connection_closed".to_owned()),
                    });
                }
            }
        }
    }

    fn absorb_publish_ok(&mut self, url: &NormRelayUrl, event: &WsEvent) -> bool {
        if self.in_flight.is_empty() {
            return false;
        }
        let WsEvent::Message(WsMessage::Text(txt)) = event else {
            return false;
        };
        let Ok(RelayMessage::Ok(res)) = RelayMessage::from_json(txt) else {
            return false;
        };
        let Some(pending) = self.in_flight.get_mut(&res.event_id) else {
            return false;
        };
        if let Some(slot) = pending.waiting.get_mut(url) {
            if slot.is_none() {
                *slot = Some(RelayPublishResult {
                    relay: url.as_str().to_owned(),
                    success: res.accepted,
                    error: if res.accepted {
                        None
                    } else {
                        Some(res.message)
                    },
                });
            }
        }
        true
    }

    /// Send `["EVENT", ...]` to every destination and wait up to the
    /// publish timeout for each to report `["OK", ...]`. Destinations
    /// succeed and fail independently; the outcome lists all of them.
    pub fn publish(&mut self, event: &Event) -> Result<PublishOutcome, Error> {
        let id = event.id.hex();
        if self.in_flight.contains_key(&id) {
            return Err(Error::DuplicatePublish);
        }

        let deadline = Instant::now() + self.publish_timeout;
        let mut waiting: HashMap<NormRelayUrl, Option<RelayPublishResult>> = HashMap::new();

        for relay in &mut self.relays {
            let url = relay.conn.url.clone();
            if relay.conn.is_connected() {
                relay.conn.send(&ClientMessage::event(event));
                waiting.insert(url, None);
            } else {
                warn!("not connected to {}, publish will not reach it", url);
                let result = RelayPublishResult {
                    relay: url.as_str().to_owned(),
                    success: false,
                    error: Some("connection_closed".to_owned()),
                };
                waiting.insert(url, Some(result));
            }
        }

        self.in_flight.insert(id.clone(), PendingPublish { deadline, waiting });

        loop {
            while let Some(ev) = self.poll_sockets() {
                self.backlog.push_back(ev);
            }

            let settled = self
                .in_flight
                .get(&id)
                .map(|p| p.waiting.values().all(|v| v.is_some()))
                .unwrap_or(true);
            if settled || Instant::now() >= deadline {
                break;
            }

            std::thread::sleep(Duration::from_millis(20));
        }

        let pending = self
            .in_flight
            .remove(&id)
            .ok_or_else(|| Error::Generic("in-flight publish entry vanished".to_owned()))?;

        let mut results: Vec<RelayPublishResult> = pending
            .waiting
            .into_iter()
            .map(|(url, slot)| {
                slot.unwrap_or(RelayPublishResult {
                    relay: url.as_str().to_owned(),
                    success: false,
                    error: Some("timeout".to_owned()),
                })
            })
            .collect();
        results.sort_by(|a, b| a.relay.cmp(&b.relay));

        let success_count = results.iter().filter(|r| r.success).count();
        Ok(PublishOutcome {
            results,
            success_count,
        })
    }
}
