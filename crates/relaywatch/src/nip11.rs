use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver};
use relaywire::NormRelayUrl;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Relay information document (NIP-11). A sparse record: relays fill in
/// whatever they feel like, so every field is optional and unknown fields
/// are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Nip11Info {
    pub name: Option<String>,
    pub description: Option<String>,
    /// Operator public key as hex
    pub pubkey: Option<String>,
    pub contact: Option<String>,
    pub supported_nips: Option<Vec<u16>>,
    pub software: Option<String>,
    pub version: Option<String>,
    pub limitation: Option<Limitation>,
    pub fees: Option<FeeSchedules>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub retention: Vec<Retention>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub relay_countries: Vec<String>,
    pub posting_policy: Option<String>,
    pub payments_url: Option<String>,
    pub icon: Option<String>,
}

impl Nip11Info {
    pub fn from_json(s: &str) -> Option<Self> {
        serde_json::from_str(s).ok()
    }

    /// Does the document say who this relay is at all?
    pub fn has_identity(&self) -> bool {
        self.name.is_some() || self.description.is_some()
    }

    pub fn limitation(&self) -> Option<&Limitation> {
        self.limitation.as_ref()
    }

    pub fn auth_required(&self) -> bool {
        self.limitation
            .as_ref()
            .and_then(|l| l.auth_required)
            .unwrap_or(false)
    }

    pub fn payment_required(&self) -> bool {
        self.limitation
            .as_ref()
            .and_then(|l| l.payment_required)
            .unwrap_or(false)
    }

    pub fn restricted_writes(&self) -> bool {
        self.limitation
            .as_ref()
            .and_then(|l| l.restricted_writes)
            .unwrap_or(false)
    }
}

/// Limitations the relay imposes on clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limitation {
    pub max_message_length: Option<i64>,
    pub max_subscriptions: Option<i64>,
    pub max_filters: Option<i64>,
    pub max_limit: Option<i64>,
    pub max_subid_length: Option<i64>,
    pub max_event_tags: Option<i64>,
    pub max_content_length: Option<i64>,
    pub min_pow_difficulty: Option<i64>,
    pub auth_required: Option<bool>,
    pub payment_required: Option<bool>,
    pub restricted_writes: Option<bool>,
    pub created_at_lower_limit: Option<u64>,
    pub created_at_upper_limit: Option<u64>,
}

impl Limitation {
    /// Number of limits the operator bothered to document.
    pub fn documented_limits(&self) -> u32 {
        let mut n = 0;
        n += self.max_message_length.is_some() as u32;
        n += self.max_subscriptions.is_some() as u32;
        n += self.max_filters.is_some() as u32;
        n += self.max_limit.is_some() as u32;
        n += self.max_subid_length.is_some() as u32;
        n += self.max_event_tags.is_some() as u32;
        n += self.max_content_length.is_some() as u32;
        n += self.min_pow_difficulty.is_some() as u32;
        n += self.auth_required.is_some() as u32;
        n += self.payment_required.is_some() as u32;
        n += self.restricted_writes.is_some() as u32;
        n += self.created_at_lower_limit.is_some() as u32;
        n += self.created_at_upper_limit.is_some() as u32;
        n
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Retention {
    pub kinds: Option<Vec<u64>>,
    pub time: Option<u64>,
    pub count: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeSchedules {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub admission: Vec<FeeSchedule>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub subscription: Vec<FeeSchedule>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub publication: Vec<FeeSchedule>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeSchedule {
    pub amount: i64,
    pub unit: String,
    pub period: Option<i64>,
    pub kinds: Option<Vec<u64>>,
}

/// Outcome of a NIP-11 fetch, delivered over a channel so the fetch can
/// run alongside the websocket open.
#[derive(Debug)]
pub struct Nip11Fetch {
    pub info: Option<Nip11Info>,
    pub elapsed_ms: u64,
    pub error: Option<String>,
}

/// Fetch the relay information document over HTTP with
/// `Accept: application/nostr+json`. Returns immediately; the result
/// arrives on the channel when the request settles. A failed fetch is an
/// empty `info`, never an error for the caller.
pub fn fetch_nip11(url: &NormRelayUrl) -> Receiver<Nip11Fetch> {
    let (tx, rx) = bounded(1);
    let http_url = url.http_url();
    let started = Instant::now();

    let mut request = ehttp::Request::get(&http_url);
    request
        .headers
        .insert("Accept".to_string(), "application/nostr+json".to_string());

    debug!("fetching nip11 from {}", http_url);
    ehttp::fetch(request, move |response| {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let fetch = match response {
            Ok(resp) if resp.ok => {
                let info = std::str::from_utf8(&resp.bytes)
                    .ok()
                    .and_then(Nip11Info::from_json);
                let error = if info.is_none() {
                    Some("unparseable nip11 document".to_string())
                } else {
                    None
                };
                Nip11Fetch {
                    info,
                    elapsed_ms,
                    error,
                }
            }
            Ok(resp) => Nip11Fetch {
                info: None,
                elapsed_ms,
                error: Some(format!("http status {}", resp.status)),
            },
            Err(err) => Nip11Fetch {
                info: None,
                elapsed_ms,
                error: Some(err),
            },
        };
        // receiver may have given up already; that's fine
        let _ = tx.send(fetch);
    });

    rx
}

/// Wait for a pending fetch, up to `timeout`.
pub fn join_nip11(rx: &Receiver<Nip11Fetch>, timeout: Duration) -> Nip11Fetch {
    rx.recv_timeout(timeout).unwrap_or(Nip11Fetch {
        info: None,
        elapsed_ms: timeout.as_millis() as u64,
        error: Some("timeout".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sparse_document() {
        let json = r#"{
            "name": "test relay",
            "supported_nips": [1, 11, 50],
            "limitation": {"auth_required": true, "max_subscriptions": 20},
            "unknown_field": {"ignored": true}
        }"#;
        let info = Nip11Info::from_json(json).unwrap();
        assert_eq!(info.name.as_deref(), Some("test relay"));
        assert_eq!(info.supported_nips, Some(vec![1, 11, 50]));
        assert!(info.auth_required());
        assert!(!info.payment_required());
        assert_eq!(info.limitation.as_ref().unwrap().documented_limits(), 2);
    }

    #[test]
    fn empty_document_is_fine() {
        let info = Nip11Info::from_json("{}").unwrap();
        assert!(!info.has_identity());
        assert!(info.limitation.is_none());
    }

    #[test]
    fn garbage_is_none() {
        assert!(Nip11Info::from_json("not json").is_none());
    }

    #[test]
    fn fees_parse() {
        let json = r#"{
            "limitation": {"payment_required": true},
            "fees": {"admission": [{"amount": 1000, "unit": "msats"}]}
        }"#;
        let info = Nip11Info::from_json(json).unwrap();
        assert!(info.payment_required());
        assert_eq!(info.fees.unwrap().admission[0].amount, 1000);
    }
}
