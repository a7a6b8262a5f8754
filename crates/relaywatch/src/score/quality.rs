use relaywire::NormRelayUrl;

use crate::nip11::Nip11Info;
use crate::operator::OperatorResolution;

use super::clamp_score;

/// How clearly the operator documents what the relay is and how it is run.
/// Additive over the NIP-11 document, with hard caps applied last so a
/// wall of limits can't paper over a nameless, contactless relay.
pub fn policy_clarity_score(nip11: Option<&Nip11Info>) -> u8 {
    let Some(info) = nip11 else {
        return 50;
    };

    let mut score: f64 = 50.0;

    let has_name = info.name.is_some();
    let has_description = info.description.is_some();
    if has_name && has_description {
        score += 15.0;
    } else if has_name || has_description {
        score += 8.0;
    }

    if info.contact.is_some() {
        score += 15.0;
    }

    if info.software.is_some() || info.version.is_some() {
        score += 5.0;
    }

    if let Some(limitation) = info.limitation() {
        score += 10.0;
        score += limitation.documented_limits() as f64;
    }

    if info.payment_required() {
        if info.fees.is_some() {
            score += 5.0;
        } else {
            score -= 10.0;
        }
    }

    // caps last
    if !info.has_identity() {
        score = score.min(50.0);
    }
    if info.contact.is_none() {
        score = score.min(70.0);
    }
    if info.limitation.is_none() {
        score = score.min(85.0);
    }

    clamp_score(score)
}

/// Transport security by scheme.
pub fn security_score(url: &NormRelayUrl) -> u8 {
    match url.scheme() {
        "wss" => 100,
        "ws" => 0,
        _ => 50,
    }
}

/// Verified operators score by how the claim was verified, averaged with
/// the web-of-trust score when one is known.
pub fn operator_score(operator: Option<&OperatorResolution>) -> u8 {
    let Some(resolution) = operator else {
        return 50;
    };
    if resolution.operator.is_none() {
        return 50;
    }

    let v = resolution.method.base_confidence() as f64;
    match resolution.trust_score {
        Some(w) => clamp_score((v + w as f64) / 2.0),
        None => clamp_score(v),
    }
}

/// Quality composite: 60% policy clarity, 25% security, 15% operator.
/// Integer arithmetic so half-points round predictably.
pub fn quality_score(
    nip11: Option<&Nip11Info>,
    url: &NormRelayUrl,
    operator: Option<&OperatorResolution>,
) -> u8 {
    let policy = policy_clarity_score(nip11) as u32;
    let security = security_score(url) as u32;
    let op = operator_score(operator) as u32;
    let weighted = 60 * policy + 25 * security + 15 * op;
    ((weighted + 50) / 100).min(100) as u8
}
