use std::time::{Duration, Instant};

use relaywire::ewebsock::{WsEvent, WsMessage};
use relaywire::{ClientMessage, Filter, NormRelayUrl, RelayMessage, RelayPool, SubId};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::nip11::{fetch_nip11, join_nip11, Nip11Info};
use crate::time::unix_seconds;

/// What kind of relay the probe decided it was talking to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayType {
    General,
    Nip46,
    Specialized,
    Unknown,
}

impl RelayType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayType::General => "general",
            RelayType::Nip46 => "nip46",
            RelayType::Specialized => "specialized",
            RelayType::Unknown => "unknown",
        }
    }
}

/// How much of the relay is reachable without credentials or payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    Open,
    Restricted,
    AuthRequired,
    PaymentRequired,
    Unknown,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Open => "open",
            AccessLevel::Restricted => "restricted",
            AccessLevel::AuthRequired => "auth_required",
            AccessLevel::PaymentRequired => "payment_required",
            AccessLevel::Unknown => "unknown",
        }
    }

    /// Classify a `["CLOSED", ...]` reason by its machine-readable prefix.
    pub fn from_closed_reason(reason: &str) -> Self {
        if reason.starts_with("auth-required") {
            AccessLevel::AuthRequired
        } else if reason.starts_with("payment-required") {
            AccessLevel::PaymentRequired
        } else if reason.starts_with("restricted") {
            AccessLevel::Restricted
        } else {
            AccessLevel::Unknown
        }
    }
}

/// One probe attempt against one relay. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub url: NormRelayUrl,
    /// unix seconds
    pub timestamp: u64,
    pub reachable: bool,
    pub relay_type: RelayType,
    pub access_level: AccessLevel,
    /// milliseconds from dial to socket open
    pub connect_time: Option<u64>,
    pub nip11_fetch_time: Option<u64>,
    /// milliseconds from REQ to first EVENT or EOSE
    pub read_time: Option<u64>,
    pub write_time: Option<u64>,
    pub nip11: Option<Nip11Info>,
    /// raw reason string of a `["CLOSED", ...]` on the probe subscription
    pub closed_reason: Option<String>,
    pub error: Option<String>,
}

impl ProbeResult {
    pub fn unreachable(url: NormRelayUrl, timestamp: u64, error: String) -> Self {
        ProbeResult {
            url,
            timestamp,
            reachable: false,
            relay_type: RelayType::Unknown,
            access_level: AccessLevel::Unknown,
            connect_time: None,
            nip11_fetch_time: None,
            read_time: None,
            write_time: None,
            nip11: None,
            closed_reason: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProbeTimeouts {
    pub connect: Duration,
    pub nip11: Duration,
    pub read: Duration,
}

impl Default for ProbeTimeouts {
    fn default() -> Self {
        ProbeTimeouts {
            connect: Duration::from_secs(10),
            nip11: Duration::from_secs(10),
            read: Duration::from_secs(10),
        }
    }
}

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Actively measures one relay at a time: dial, NIP-11, one read query.
#[derive(Default)]
pub struct Prober {
    pub timeouts: ProbeTimeouts,
}

impl Prober {
    pub fn new() -> Self {
        Prober::default()
    }

    pub fn with_timeouts(timeouts: ProbeTimeouts) -> Self {
        Prober { timeouts }
    }

    /// Probe one relay. Never fails: every error ends up inside the
    /// returned [`ProbeResult`].
    pub fn probe(&self, url: &NormRelayUrl) -> ProbeResult {
        let timestamp = unix_seconds();

        // the NIP-11 fetch runs on its own while we dial the socket;
        // neither failing fails the other
        let nip11_rx = fetch_nip11(url);
        let nip11_deadline = Instant::now() + self.timeouts.nip11;

        let mut conn = match RelayPool::ephemeral(url.clone(), || {}) {
            Ok(conn) => conn,
            Err(err) => {
                let mut result =
                    ProbeResult::unreachable(url.clone(), timestamp, err.to_string());
                self.finish_nip11(&mut result, &nip11_rx, nip11_deadline);
                return result;
            }
        };

        // connect phase
        let connect_started = Instant::now();
        let connect_deadline = connect_started + self.timeouts.connect;
        let mut connect_time = None;
        let mut connect_error = None;

        loop {
            match conn.try_recv() {
                Some(WsEvent::Opened) => {
                    connect_time = Some(connect_started.elapsed().as_millis() as u64);
                    break;
                }
                Some(WsEvent::Closed) => {
                    connect_error = Some("connection closed before open".to_string());
                    break;
                }
                Some(WsEvent::Error(err)) => {
                    connect_error = Some(err);
                    break;
                }
                Some(WsEvent::Message(_)) => {}
                None => {
                    if Instant::now() >= connect_deadline {
                        connect_error = Some("connect timeout".to_string());
                        break;
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
            }
        }

        let Some(connect_time) = connect_time else {
            let error = connect_error.unwrap_or_else(|| "connect failed".to_string());
            debug!("probe of {} failed to connect: {}", url, error);
            let mut result = ProbeResult::unreachable(url.clone(), timestamp, error);
            self.finish_nip11(&mut result, &nip11_rx, nip11_deadline);
            result.relay_type = classify_relay_type(result.nip11.as_ref());
            return result;
        };

        // read phase: one tiny REQ, timed to the first EVENT or EOSE
        let sub = SubId::new("probe-read");
        conn.send(&ClientMessage::req(
            sub.as_str().to_owned(),
            vec![Filter::new().kinds(vec![1]).limit(1)],
        ));

        let read_started = Instant::now();
        let read_deadline = read_started + self.timeouts.read;
        let mut read_time = None;
        let mut closed_reason: Option<String> = None;
        let mut read_error = None;

        loop {
            match conn.try_recv() {
                Some(WsEvent::Message(WsMessage::Text(txt))) => {
                    match RelayMessage::from_json(&txt) {
                        Ok(RelayMessage::Event { sub_id, .. }) if sub_id == sub.as_str() => {
                            read_time = Some(read_started.elapsed().as_millis() as u64);
                            break;
                        }
                        Ok(RelayMessage::Eose(sub_id)) if sub_id == sub.as_str() => {
                            read_time = Some(read_started.elapsed().as_millis() as u64);
                            break;
                        }
                        Ok(RelayMessage::Closed { sub_id, reason }) if sub_id == sub.as_str() => {
                            debug!("probe sub closed by {}: {}", url, reason);
                            closed_reason = Some(reason);
                            break;
                        }
                        Ok(RelayMessage::Notice(notice)) => {
                            debug!("notice from {}: {}", url, notice);
                        }
                        Ok(_) => {}
                        Err(err) => {
                            warn!("unparseable frame from {}: {}", url, err);
                        }
                    }
                }
                Some(WsEvent::Closed) | Some(WsEvent::Error(_)) => {
                    read_error = Some("connection lost during read".to_string());
                    break;
                }
                Some(_) => {}
                None => {
                    if Instant::now() >= read_deadline {
                        break;
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
            }
        }

        conn.send(&ClientMessage::close(sub.as_str().to_owned()));

        let mut result = ProbeResult {
            url: url.clone(),
            timestamp,
            reachable: true,
            relay_type: RelayType::Unknown,
            access_level: AccessLevel::Unknown,
            connect_time: Some(connect_time),
            nip11_fetch_time: None,
            read_time,
            write_time: None,
            nip11: None,
            closed_reason: closed_reason.clone(),
            error: read_error,
        };
        self.finish_nip11(&mut result, &nip11_rx, nip11_deadline);

        result.relay_type = classify_relay_type(result.nip11.as_ref());
        result.access_level = resolve_access_level(
            closed_reason.as_deref(),
            result.nip11.as_ref(),
            read_time.is_some(),
        );

        result
    }

    fn finish_nip11(
        &self,
        result: &mut ProbeResult,
        rx: &crossbeam_channel::Receiver<crate::nip11::Nip11Fetch>,
        deadline: Instant,
    ) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let fetch = join_nip11(rx, remaining);
        if fetch.info.is_some() {
            result.nip11_fetch_time = Some(fetch.elapsed_ms);
        } else if let Some(err) = fetch.error {
            debug!("nip11 fetch for {} failed: {}", result.url, err);
        }
        result.nip11 = fetch.info;
    }
}

fn classify_relay_type(nip11: Option<&Nip11Info>) -> RelayType {
    let Some(info) = nip11 else {
        return RelayType::Unknown;
    };

    let nips = info.supported_nips.as_deref().unwrap_or(&[]);
    if nips.contains(&46) && nips.len() <= 2 {
        return RelayType::Nip46;
    }
    if info.restricted_writes() || (!nips.is_empty() && nips.len() < 5) {
        return RelayType::Specialized;
    }
    RelayType::General
}

fn resolve_access_level(
    closed_reason: Option<&str>,
    nip11: Option<&Nip11Info>,
    read_ok: bool,
) -> AccessLevel {
    if let Some(reason) = closed_reason {
        return AccessLevel::from_closed_reason(reason);
    }
    if let Some(info) = nip11 {
        if info.auth_required() {
            return AccessLevel::AuthRequired;
        }
        if info.payment_required() {
            return AccessLevel::PaymentRequired;
        }
    }
    if read_ok {
        AccessLevel::Open
    } else {
        AccessLevel::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_reason_prefixes() {
        assert_eq!(
            AccessLevel::from_closed_reason("auth-required: sign in first"),
            AccessLevel::AuthRequired
        );
        assert_eq!(
            AccessLevel::from_closed_reason("payment-required: 21 sats"),
            AccessLevel::PaymentRequired
        );
        assert_eq!(
            AccessLevel::from_closed_reason("restricted: members only"),
            AccessLevel::Restricted
        );
        assert_eq!(
            AccessLevel::from_closed_reason("error: shutting down"),
            AccessLevel::Unknown
        );
    }

    #[test]
    fn relay_type_classification() {
        assert_eq!(classify_relay_type(None), RelayType::Unknown);

        let bunker = Nip11Info {
            supported_nips: Some(vec![46]),
            ..Default::default()
        };
        assert_eq!(classify_relay_type(Some(&bunker)), RelayType::Nip46);

        let restricted = Nip11Info {
            supported_nips: Some(vec![1, 11, 50, 42, 40, 9]),
            limitation: Some(crate::nip11::Limitation {
                restricted_writes: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(classify_relay_type(Some(&restricted)), RelayType::Specialized);

        let narrow = Nip11Info {
            supported_nips: Some(vec![1, 11]),
            ..Default::default()
        };
        assert_eq!(classify_relay_type(Some(&narrow)), RelayType::Specialized);

        let general = Nip11Info {
            supported_nips: Some(vec![1, 2, 9, 11, 40, 42, 50]),
            ..Default::default()
        };
        assert_eq!(classify_relay_type(Some(&general)), RelayType::General);
    }

    #[test]
    fn access_level_resolution() {
        // CLOSED reason wins over nip11 flags
        let info = Nip11Info {
            limitation: Some(crate::nip11::Limitation {
                payment_required: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(
            resolve_access_level(Some("auth-required: x"), Some(&info), false),
            AccessLevel::AuthRequired
        );
        assert_eq!(
            resolve_access_level(None, Some(&info), true),
            AccessLevel::PaymentRequired
        );
        assert_eq!(resolve_access_level(None, None, true), AccessLevel::Open);
        assert_eq!(resolve_access_level(None, None, false), AccessLevel::Unknown);
    }

    #[test]
    fn unreachable_probe_has_no_timings() {
        let url = NormRelayUrl::parse("wss://dead.example.com").unwrap();
        let probe = ProbeResult::unreachable(url, 1700000000, "connect timeout".into());
        assert!(!probe.reachable);
        assert!(probe.connect_time.is_none());
        assert!(probe.read_time.is_none());
        assert_eq!(probe.error.as_deref(), Some("connect timeout"));
    }
}
