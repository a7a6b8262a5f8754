use crossbeam_channel::{unbounded, Receiver, Sender};
use relaywire::{FullKeypair, NormRelayUrl, Pubkey, RelayPool, RelayPublishResult};
use tracing::{debug, info, warn};

use crate::assertion::RelayAssertion;
use crate::error::Result;
use crate::store::{DataStore, PublishedAssertionRecord};
use crate::time::unix_seconds;

pub const DEFAULT_MATERIAL_CHANGE_THRESHOLD: u8 = 3;
pub const SKIP_NO_MATERIAL_CHANGE: &str = "no_material_change";

/// Fire-and-forget publish notifications.
#[derive(Debug, Clone)]
pub enum PublishNotification {
    Published {
        relay_url: NormRelayUrl,
        event_id: String,
        accepted_by: usize,
    },
    Skipped {
        relay_url: NormRelayUrl,
        reason: String,
    },
    Failed {
        relay_url: NormRelayUrl,
        error: String,
    },
}

#[derive(Debug, Clone)]
pub struct PublishReport {
    pub relay_url: NormRelayUrl,
    /// Reason the publish was skipped, e.g. [`SKIP_NO_MATERIAL_CHANGE`].
    pub skipped: Option<String>,
    /// True when at least one downstream relay accepted the event.
    pub success: bool,
    pub event_id: Option<String>,
    pub results: Vec<RelayPublishResult>,
}

impl PublishReport {
    fn skipped(relay_url: NormRelayUrl, reason: &str) -> Self {
        PublishReport {
            relay_url,
            skipped: Some(reason.to_string()),
            success: false,
            event_id: None,
            results: vec![],
        }
    }
}

/// Did anything move enough since the last published record to justify a
/// resign-and-republish?
pub fn has_material_change(
    previous: Option<&PublishedAssertionRecord>,
    current: &RelayAssertion,
    threshold: u8,
) -> bool {
    let Some(previous) = previous else {
        return true;
    };

    if previous.confidence != current.confidence {
        return true;
    }
    if previous.status != current.status {
        return true;
    }

    let threshold = threshold as i32;
    let delta = |a: u8, b: u8| (a as i32 - b as i32).abs();

    if delta(previous.score, current.score) >= threshold {
        return true;
    }
    if delta(previous.reliability, current.reliability) >= threshold {
        return true;
    }

    for (prev, cur) in [
        (previous.quality, current.quality),
        (previous.accessibility, current.accessibility),
    ] {
        match (prev, cur) {
            (Some(p), Some(c)) if delta(p, c) >= threshold => return true,
            // a component that just became measurable is news
            (None, Some(_)) => return true,
            _ => {}
        }
    }

    false
}

/// Signs assertions and pushes them to the downstream relays, recording
/// what was published so the next round can gate on material change.
pub struct Publisher {
    keypair: FullKeypair,
    pub threshold: u8,
    notify: Option<Sender<PublishNotification>>,
}

impl Publisher {
    /// Construct from a secret in hex or `nsec` bech32 form. A bad key
    /// fails here, never during a publish.
    pub fn new(secret: &str, threshold: u8) -> Result<Self> {
        Ok(Publisher {
            keypair: FullKeypair::parse(secret)?,
            threshold,
            notify: None,
        })
    }

    pub fn from_keypair(keypair: FullKeypair, threshold: u8) -> Self {
        Publisher {
            keypair,
            threshold,
            notify: None,
        }
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey
    }

    /// Subscribe an observer to publish outcomes.
    pub fn notifications(&mut self) -> Receiver<PublishNotification> {
        let (tx, rx) = unbounded();
        self.notify = Some(tx);
        rx
    }

    /// Publish with the material-change gate.
    pub fn publish(
        &self,
        pool: &mut RelayPool,
        store: &dyn DataStore,
        assertion: &RelayAssertion,
    ) -> Result<PublishReport> {
        let previous = store.get_last_published_assertion(&assertion.relay_url)?;
        if !has_material_change(previous.as_ref(), assertion, self.threshold) {
            debug!("no material change for {}, skipping", assertion.relay_url);
            self.emit(PublishNotification::Skipped {
                relay_url: assertion.relay_url.clone(),
                reason: SKIP_NO_MATERIAL_CHANGE.to_string(),
            });
            return Ok(PublishReport::skipped(
                assertion.relay_url.clone(),
                SKIP_NO_MATERIAL_CHANGE,
            ));
        }

        self.send(pool, store, assertion)
    }

    /// Publish unconditionally, bypassing the material-change gate.
    pub fn force_publish(
        &self,
        pool: &mut RelayPool,
        store: &dyn DataStore,
        assertion: &RelayAssertion,
    ) -> Result<PublishReport> {
        self.send(pool, store, assertion)
    }

    /// Publish a batch one relay at a time. Sequencing is deliberate: it
    /// caps the outbound rate toward the downstream relays.
    pub fn publish_batch(
        &self,
        pool: &mut RelayPool,
        store: &dyn DataStore,
        assertions: &[RelayAssertion],
        force: bool,
    ) -> Vec<PublishReport> {
        assertions
            .iter()
            .map(|assertion| {
                let result = if force {
                    self.force_publish(pool, store, assertion)
                } else {
                    self.publish(pool, store, assertion)
                };
                result.unwrap_or_else(|err| {
                    warn!("publish for {} failed: {}", assertion.relay_url, err);
                    self.emit(PublishNotification::Failed {
                        relay_url: assertion.relay_url.clone(),
                        error: err.to_string(),
                    });
                    PublishReport {
                        relay_url: assertion.relay_url.clone(),
                        skipped: None,
                        success: false,
                        event_id: None,
                        results: vec![],
                    }
                })
            })
            .collect()
    }

    fn send(
        &self,
        pool: &mut RelayPool,
        store: &dyn DataStore,
        assertion: &RelayAssertion,
    ) -> Result<PublishReport> {
        let now = unix_seconds();
        let unsigned = assertion.to_unsigned_event(self.keypair.pubkey, now);
        let event = unsigned.sign(&self.keypair.keys()).map_err(crate::error::Error::Wire)?;
        let event_id = event.id.hex();

        let outcome = pool.publish(&event).map_err(crate::error::Error::Wire)?;
        let success = outcome.accepted();

        if success {
            // only a successful publish moves the baseline; on failure the
            // next round retries against the old record
            store.store_published_assertion(PublishedAssertionRecord {
                relay_url: assertion.relay_url.clone(),
                status: assertion.status,
                score: assertion.score,
                reliability: assertion.reliability,
                quality: assertion.quality,
                accessibility: assertion.accessibility,
                confidence: assertion.confidence,
                event_id: event_id.clone(),
                published_at: now,
            })?;
            info!(
                relay = %assertion.relay_url,
                event = %event_id,
                accepted_by = outcome.success_count,
                "published assertion"
            );
            self.emit(PublishNotification::Published {
                relay_url: assertion.relay_url.clone(),
                event_id: event_id.clone(),
                accepted_by: outcome.success_count,
            });
        } else {
            let error = outcome
                .results
                .iter()
                .find_map(|r| r.error.clone())
                .unwrap_or_else(|| "no destinations".to_string());
            warn!(relay = %assertion.relay_url, "assertion publish failed: {}", error);
            self.emit(PublishNotification::Failed {
                relay_url: assertion.relay_url.clone(),
                error,
            });
        }

        Ok(PublishReport {
            relay_url: assertion.relay_url.clone(),
            skipped: None,
            success,
            event_id: Some(event_id),
            results: outcome.results,
        })
    }

    fn emit(&self, notification: PublishNotification) {
        if let Some(tx) = &self.notify {
            let _ = tx.send(notification);
        }
    }
}
