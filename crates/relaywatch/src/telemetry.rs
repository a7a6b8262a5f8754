use relaywire::{Event, NormRelayUrl, Pubkey};
use serde::{Deserialize, Serialize};

use crate::TELEMETRY_KIND;

/// Upper bound for plausible round-trip times. Anything above is a broken
/// monitor clock or unit confusion and gets dropped tag-by-tag.
pub const RTT_MAX_MS: u32 = 60_000;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum MetricParseError {
    #[error("wrong kind {0}")]
    WrongKind(u64),

    #[error("missing d tag")]
    MissingRelayUrl,

    #[error("invalid relay url in d tag")]
    InvalidRelayUrl,
}

/// One third-party measurement of one relay, parsed out of a kind-30166
/// event. Keyed uniquely by `event_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryMetric {
    pub event_id: String,
    pub relay_url: NormRelayUrl,
    pub monitor: Pubkey,
    /// unix seconds
    pub timestamp: u64,
    pub rtt_open: Option<u32>,
    pub rtt_read: Option<u32>,
    pub rtt_write: Option<u32>,
    pub network: Option<String>,
    pub supported_nips: Vec<u16>,
    pub geohash: Option<String>,
}

impl TelemetryMetric {
    /// Parse a telemetry event. A missing or bad `d` tag rejects the
    /// event; a bad rtt or NIP value only drops that value.
    pub fn from_event(ev: &Event) -> Result<Self, MetricParseError> {
        if ev.kind != TELEMETRY_KIND {
            return Err(MetricParseError::WrongKind(ev.kind));
        }

        let d = ev
            .tag_value("d")
            .ok_or(MetricParseError::MissingRelayUrl)?;
        let relay_url =
            NormRelayUrl::parse(d).map_err(|_| MetricParseError::InvalidRelayUrl)?;

        Ok(TelemetryMetric {
            event_id: ev.id.hex(),
            relay_url,
            monitor: ev.pubkey,
            timestamp: ev.created_at,
            rtt_open: ev.tag_value("rtt-open").and_then(parse_rtt),
            rtt_read: ev.tag_value("rtt-read").and_then(parse_rtt),
            rtt_write: ev.tag_value("rtt-write").and_then(parse_rtt),
            network: ev.tag_value("n").map(str::to_owned),
            supported_nips: parse_nip_tags(ev),
            geohash: ev.tag_value("g").map(str::to_owned),
        })
    }
}

fn parse_rtt(value: &str) -> Option<u32> {
    value.trim().parse::<u32>().ok().filter(|ms| *ms <= RTT_MAX_MS)
}

/// `N` tags may repeat and each value may itself be a comma-separated
/// list. Values outside 1..=65535 are dropped.
fn parse_nip_tags(ev: &Event) -> Vec<u16> {
    let mut nips: Vec<u16> = Vec::new();
    for tag in ev.tags_named("N") {
        for value in tag.iter().skip(1) {
            for part in value.split(',') {
                if let Ok(nip) = part.trim().parse::<u32>() {
                    if (1..=65535).contains(&nip) {
                        nips.push(nip as u16);
                    }
                }
            }
        }
    }
    nips.sort_unstable();
    nips.dedup();
    nips
}

/// Book-keeping about one monitor, updated as its events come in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorStats {
    pub pubkey: Pubkey,
    pub first_seen: u64,
    pub last_seen: u64,
    pub event_count: u64,
    /// Announced probe frequency in seconds, from a kind-10166 event.
    pub announced_frequency: Option<u64>,
}
