pub mod assertion;
pub mod config;
pub mod countries;
mod error;
pub mod geo;
pub mod ingest;
pub mod nip11;
pub mod operator;
pub mod probe;
pub mod publish;
pub mod ratelimit;
pub mod score;
pub mod store;
pub mod telemetry;
mod time;

pub use assertion::{
    build_assertion, AlgorithmMeta, AssertionContext, AssertionStatus, Network, Policy,
    RelayAssertion,
};
pub use config::{Args, Config};
pub use countries::{Alliance, CountryIntel};
pub use error::{Error, Result};
pub use geo::{GeoResolver, JurisdictionInfo};
pub use ingest::{IngestConfig, IngestNotification, MonitorIngestor};
pub use nip11::Nip11Info;
pub use operator::{OperatorResolution, VerificationMethod};
pub use probe::{AccessLevel, ProbeResult, ProbeTimeouts, Prober, RelayType};
pub use publish::{PublishNotification, PublishReport, Publisher};
pub use ratelimit::RateLimiter;
pub use score::{score_relay, Confidence, ScoreInputs, Scores};
pub use store::{DataStore, MemoryDataStore, PublishedAssertionRecord, TelemetryStats};
pub use time::unix_seconds;

/// Telemetry events published by monitors (NIP-66 relay discovery).
pub const TELEMETRY_KIND: u64 = 30166;

/// Monitor self-announcements.
pub const MONITOR_ANNOUNCEMENT_KIND: u64 = 10166;

/// Our signed relay trust assertions.
pub const ASSERTION_KIND: u64 = 30385;
