use crate::probe::ProbeResult;
use crate::store::TelemetryStats;

use super::clamp_score;

/// Monitors reporting on fewer relays than this have too little context to
/// rank latencies against. Re-checked every scoring round, never cached.
pub const QUALIFYING_MONITOR_MIN_RELAYS: usize = 20;

/// Share of probes that reached the relay, 0 for an empty probe set.
pub fn uptime_score(probes: &[ProbeResult]) -> u8 {
    if probes.is_empty() {
        return 0;
    }
    let reachable = probes.iter().filter(|p| p.reachable).count();
    clamp_score(100.0 * reachable as f64 / probes.len() as f64)
}

/// How quickly the relay comes back when it goes down. Only outages with
/// an observed recovery count; a relay that is still down is handled by
/// the unreachable substitution in the overall score.
pub fn recovery_score(probes: &[ProbeResult]) -> u8 {
    if probes.len() < 2 {
        return 80;
    }

    let mut outages: Vec<u64> = Vec::new();
    let mut outage_start: Option<u64> = None;
    for probe in probes {
        if probe.reachable {
            if let Some(start) = outage_start.take() {
                outages.push(probe.timestamp.saturating_sub(start));
            }
        } else if outage_start.is_none() {
            outage_start = Some(probe.timestamp);
        }
    }

    if outages.is_empty() {
        return 100;
    }

    let avg = outages.iter().sum::<u64>() as f64 / outages.len() as f64;
    let score = if avg <= 600.0 {
        100.0 - (avg / 600.0) * 10.0
    } else if avg <= 1800.0 {
        90.0 - ((avg - 600.0) / 1200.0) * 15.0
    } else if avg <= 7200.0 {
        75.0 - ((avg - 1800.0) / 5400.0) * 25.0
    } else {
        (50.0 * (1.0 - (avg - 7200.0) / 14400.0)).max(0.0)
    };
    clamp_score(score)
}

/// Spread of connect times relative to their median. Tight interquartile
/// range means predictable performance.
pub fn consistency_score(probes: &[ProbeResult]) -> u8 {
    let mut times: Vec<u64> = probes
        .iter()
        .filter(|p| p.reachable)
        .filter_map(|p| p.connect_time)
        .collect();

    if times.len() < 3 {
        return 70;
    }
    times.sort_unstable();

    let p25 = percentile(&times, 25.0);
    let p50 = percentile(&times, 50.0);
    let p75 = percentile(&times, 75.0);

    let iqr_ratio = (p75 - p25) / p50.max(1.0);
    clamp_score(100.0 - 50.0 * iqr_ratio)
}

/// Linear-interpolated percentile of a sorted slice.
pub(crate) fn percentile(sorted: &[u64], pct: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0] as f64,
        len => {
            let rank = pct / 100.0 * (len - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let frac = rank - lo as f64;
            sorted[lo] as f64 * (1.0 - frac) + sorted[hi] as f64 * frac
        }
    }
}

/// Where `value` ranks within one monitor's latest readings across all the
/// relays it tracks. 100 = fastest, 0 = slowest, 50 when there is nothing
/// to rank against.
pub fn latency_percentile_score(value: Option<u32>, peers: &[u32]) -> f64 {
    let Some(value) = value else {
        return 50.0;
    };
    if peers.len() < 2 {
        return 50.0;
    }
    let slower = peers.iter().filter(|p| **p > value).count();
    (100.0 * slower as f64 / (peers.len() - 1) as f64).min(100.0)
}

/// Tier table for absolute latencies, the fallback when no monitor
/// qualifies for percentile ranking.
pub fn latency_tier(ms: f64) -> u8 {
    if ms <= 50.0 {
        100
    } else if ms <= 100.0 {
        95
    } else if ms <= 150.0 {
        90
    } else if ms <= 200.0 {
        85
    } else if ms <= 300.0 {
        75
    } else if ms <= 500.0 {
        60
    } else if ms <= 750.0 {
        40
    } else if ms <= 1000.0 {
        20
    } else {
        0
    }
}

pub fn latency_score(stats: &TelemetryStats, probes: &[ProbeResult]) -> u8 {
    let mut connect_pcts: Vec<f64> = Vec::new();
    let mut read_pcts: Vec<f64> = Vec::new();

    for view in &stats.monitors {
        if view.tracked_relays < QUALIFYING_MONITOR_MIN_RELAYS {
            continue;
        }
        let Some(latest) = &view.latest else {
            continue;
        };
        connect_pcts.push(latency_percentile_score(latest.open, &view.latest_open_all));
        if latest.read.is_some() {
            read_pcts.push(latency_percentile_score(latest.read, &view.latest_read_all));
        }
    }

    if connect_pcts.is_empty() {
        return latency_tier_fallback(stats, probes);
    }

    let connect = mean(&connect_pcts);
    let score = if read_pcts.is_empty() {
        connect
    } else {
        0.30 * connect + 0.70 * mean(&read_pcts)
    };
    clamp_score(score)
}

fn latency_tier_fallback(stats: &TelemetryStats, probes: &[ProbeResult]) -> u8 {
    let latest_connect = probes
        .iter()
        .rev()
        .find(|p| p.reachable)
        .and_then(|p| p.connect_time);

    let ms = match latest_connect {
        Some(ms) => ms as f64,
        None => {
            let opens: Vec<f64> = stats
                .monitors
                .iter()
                .filter_map(|m| m.latest.as_ref().and_then(|s| s.open))
                .map(|v| v as f64)
                .collect();
            if opens.is_empty() {
                return 50;
            }
            opens.iter().sum::<f64>() / opens.len() as f64
        }
    };

    latency_tier(ms)
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Reliability composite: 40% uptime, 20% recovery, 20% consistency,
/// 20% latency. Integer arithmetic so half-points round predictably.
pub fn reliability_score(probes: &[ProbeResult], stats: &TelemetryStats) -> u8 {
    let uptime = uptime_score(probes) as u32;
    let recovery = recovery_score(probes) as u32;
    let consistency = consistency_score(probes) as u32;
    let latency = latency_score(stats, probes) as u32;
    let weighted = 40 * uptime + 20 * recovery + 20 * consistency + 20 * latency;
    ((weighted + 50) / 100).min(100) as u8
}
