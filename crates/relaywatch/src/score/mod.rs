mod accessibility;
mod confidence;
mod quality;
mod reliability;

pub use accessibility::{
    accessibility_score, barriers_score, jurisdiction_score, limits_score, surveillance_score,
};
pub use confidence::{confidence_level, weighted_observations, Confidence};
pub use quality::{operator_score, policy_clarity_score, quality_score, security_score};
pub use reliability::{
    consistency_score, latency_percentile_score, latency_score, latency_tier, recovery_score,
    reliability_score, uptime_score, QUALIFYING_MONITOR_MIN_RELAYS,
};

use relaywire::NormRelayUrl;
use tracing::error;

use crate::countries::CountryIntel;
use crate::geo::JurisdictionInfo;
use crate::nip11::Nip11Info;
use crate::operator::OperatorResolution;
use crate::probe::ProbeResult;
use crate::store::TelemetryStats;

/// Clamp a raw component value into an integer score. A non-finite input
/// is a bug upstream; the computation is abandoned for the neutral value.
pub fn clamp_score(value: f64) -> u8 {
    if !value.is_finite() {
        error!(value = ?value, "non-finite score component, using neutral default");
        return 50;
    }
    value.round().clamp(0.0, 100.0) as u8
}

/// Overall weighting: 40% reliability, 35% quality, 25% accessibility.
/// When the relay is currently down, reliability is swapped for
/// `min(50, uptime)` in this formula only; the published reliability
/// component keeps the computed value.
pub fn overall_score(
    reliability: u8,
    quality: u8,
    accessibility: u8,
    latest_reachable: bool,
    uptime: u8,
) -> u8 {
    let effective_reliability = if latest_reachable {
        reliability
    } else {
        uptime.min(50)
    };
    let weighted = 40 * effective_reliability as u32 + 35 * quality as u32 + 25 * accessibility as u32;
    ((weighted + 50) / 100).min(100) as u8
}

/// Everything needed to score one relay, borrowed from the stores.
pub struct ScoreInputs<'a> {
    pub url: &'a NormRelayUrl,
    pub probes: &'a [ProbeResult],
    pub stats: &'a TelemetryStats,
    pub nip11: Option<&'a Nip11Info>,
    pub operator: Option<&'a OperatorResolution>,
    pub jurisdiction: Option<&'a JurisdictionInfo>,
    pub intel: &'a CountryIntel,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scores {
    pub overall: u8,
    pub reliability: u8,
    pub quality: u8,
    pub accessibility: u8,
    pub uptime: u8,
    pub confidence: Confidence,
    pub weighted_observations: f64,
    pub latest_reachable: bool,
    /// unix seconds of the earliest observation, `now` when there is none
    pub first_seen: u64,
    pub period_days: f64,
}

/// Derive all scores for one relay at `now`. Pure: every input comes in
/// through [`ScoreInputs`].
pub fn score_relay(inputs: &ScoreInputs<'_>, now: u64) -> Scores {
    let uptime = uptime_score(inputs.probes);
    let reliability = reliability_score(inputs.probes, inputs.stats);
    let quality = quality_score(inputs.nip11, inputs.url, inputs.operator);

    let country = inputs.jurisdiction.map(|j| j.country_code.as_str());
    let accessibility = accessibility_score(inputs.nip11, country, inputs.intel);

    let latest_reachable = inputs
        .probes
        .last()
        .map(|p| p.reachable)
        .unwrap_or(false);
    let overall = overall_score(reliability, quality, accessibility, latest_reachable, uptime);

    let first_probe = inputs.probes.first().map(|p| p.timestamp);
    let first_seen = match (first_probe, inputs.stats.first_seen) {
        (Some(p), Some(t)) => p.min(t),
        (Some(p), None) => p,
        (None, Some(t)) => t,
        (None, None) => now,
    };
    let period_days = now.saturating_sub(first_seen) as f64 / 86_400.0;

    let weighted = weighted_observations(
        inputs.probes.len() as u64,
        inputs.stats.event_count,
        inputs.stats.monitor_count,
        period_days,
    );

    Scores {
        overall,
        reliability,
        quality,
        accessibility,
        uptime,
        confidence: confidence_level(weighted),
        weighted_observations: weighted,
        latest_reachable,
        first_seen,
        period_days,
    }
}
