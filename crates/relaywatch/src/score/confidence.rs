use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "low" => Confidence::Low,
            "medium" => Confidence::Medium,
            "high" => Confidence::High,
            _ => return None,
        })
    }
}

/// Telemetry counts more when many independent monitors contributed over a
/// long period; a single probe counts as exactly one observation.
pub fn weighted_observations(
    probe_count: u64,
    telemetry_count: u64,
    monitor_count: usize,
    period_days: f64,
) -> f64 {
    let monitor_bonus = 1.0 + monitor_count as f64 / 10.0;
    let time_factor = 1.0 + period_days.clamp(0.0, 30.0) / 30.0;
    probe_count as f64 + telemetry_count as f64 * monitor_bonus * time_factor
}

pub fn confidence_level(weighted_observations: f64) -> Confidence {
    if weighted_observations < 100.0 {
        Confidence::Low
    } else if weighted_observations < 500.0 {
        Confidence::Medium
    } else {
        Confidence::High
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probes_alone_pass_through() {
        for p in [0u64, 1, 50, 1000] {
            for d in [0.0, 1.0, 15.0, 400.0] {
                assert_eq!(weighted_observations(p, 0, 0, d), p as f64);
            }
        }
    }

    #[test]
    fn telemetry_is_bonused() {
        // 50 probes + 100 metrics from 5 monitors over 15 days
        assert_eq!(weighted_observations(50, 100, 5, 15.0), 275.0);
    }

    #[test]
    fn time_factor_saturates_at_thirty_days() {
        assert_eq!(
            weighted_observations(0, 10, 0, 30.0),
            weighted_observations(0, 10, 0, 90.0)
        );
    }

    #[test]
    fn confidence_thresholds() {
        assert_eq!(confidence_level(99.0), Confidence::Low);
        assert_eq!(confidence_level(100.0), Confidence::Medium);
        assert_eq!(confidence_level(499.0), Confidence::Medium);
        assert_eq!(confidence_level(500.0), Confidence::High);
    }
}
