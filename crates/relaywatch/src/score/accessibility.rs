use crate::countries::{Alliance, CountryIntel};
use crate::nip11::Nip11Info;

use super::clamp_score;

/// Multipliers for stacked barriers, largest penalty first. Stacking a
/// second and third barrier hurts less than the first: a paid relay that
/// also wants auth isn't twice as closed.
const BARRIER_MULTIPLIERS: [f64; 4] = [1.0, 0.5, 0.3, 0.2];

/// Entry barriers: auth, payment, proof-of-work. `restricted_writes` is
/// specialization, not a barrier, and is deliberately absent here.
pub fn barriers_score(nip11: Option<&Nip11Info>) -> u8 {
    let Some(info) = nip11 else {
        return 70;
    };

    let mut penalties: Vec<f64> = Vec::new();
    if info.payment_required() {
        penalties.push(40.0);
    }
    if info.auth_required() {
        penalties.push(30.0);
    }
    if let Some(difficulty) = info.limitation().and_then(|l| l.min_pow_difficulty) {
        if difficulty > 0 {
            penalties.push((difficulty as f64).min(15.0));
        }
    }

    penalties.sort_by(|a, b| b.total_cmp(a));
    let total: f64 = penalties
        .iter()
        .enumerate()
        .map(|(i, p)| p * BARRIER_MULTIPLIERS.get(i).copied().unwrap_or(0.2))
        .sum();

    clamp_score(100.0 - total)
}

/// Deductions for abnormally tight operational limits.
pub fn limits_score(nip11: Option<&Nip11Info>) -> u8 {
    let Some(info) = nip11 else {
        return 80;
    };
    let Some(lim) = info.limitation() else {
        return 100;
    };

    let mut score: f64 = 100.0;

    if let Some(v) = lim.max_subscriptions {
        if v < 5 {
            score -= 15.0;
        } else if v < 10 {
            score -= 5.0;
        }
    }
    if let Some(v) = lim.max_content_length {
        if v < 1000 {
            score -= 15.0;
        } else if v < 5000 {
            score -= 5.0;
        }
    }
    if let Some(v) = lim.max_message_length {
        if v < 10000 {
            score -= 10.0;
        } else if v < 32000 {
            score -= 3.0;
        }
    }
    if let Some(v) = lim.max_filters {
        if v < 5 {
            score -= 10.0;
        } else if v < 10 {
            score -= 3.0;
        }
    }
    if let Some(v) = lim.max_event_tags {
        if v < 50 {
            score -= 5.0;
        }
    }

    clamp_score(score)
}

/// Freedom-House banding: free countries carry no penalty, partly-free up
/// to 10 points, not-free 10 to 20.
pub fn jurisdiction_score(country: Option<&str>, intel: &CountryIntel) -> u8 {
    let Some(cc) = country else {
        return 75;
    };
    let Some(freedom) = intel.freedom_score(cc) else {
        return 75;
    };

    let freedom = freedom as f64;
    let penalty = if freedom >= 70.0 {
        0.0
    } else if freedom >= 40.0 {
        (69.0 - freedom) / 29.0 * 10.0
    } else {
        10.0 + (39.0 - freedom) / 39.0 * 10.0
    };

    clamp_score(100.0 - penalty)
}

pub fn surveillance_score(country: Option<&str>, intel: &CountryIntel) -> u8 {
    let alliance = country
        .map(|cc| intel.alliance(cc))
        .unwrap_or(Alliance::Unknown);

    match alliance {
        Alliance::PrivacyFriendly => 100,
        Alliance::NonAligned => 90,
        Alliance::FourteenEyes => 80,
        Alliance::NineEyes => 75,
        Alliance::FiveEyes => 70,
        Alliance::Unknown => 85,
    }
}

/// Accessibility composite: 40% barriers, 20% limits, 20% jurisdiction,
/// 20% surveillance. Integer arithmetic so half-points round predictably.
pub fn accessibility_score(
    nip11: Option<&Nip11Info>,
    country: Option<&str>,
    intel: &CountryIntel,
) -> u8 {
    let barriers = barriers_score(nip11) as u32;
    let limits = limits_score(nip11) as u32;
    let jurisdiction = jurisdiction_score(country, intel) as u32;
    let surveillance = surveillance_score(country, intel) as u32;
    let weighted = 40 * barriers + 20 * limits + 20 * jurisdiction + 20 * surveillance;
    ((weighted + 50) / 100).min(100) as u8
}
