use relaywire::{NormRelayUrl, Pubkey, UnsignedEvent};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::geo::JurisdictionInfo;
use crate::nip11::Nip11Info;
use crate::operator::{OperatorResolution, VerificationMethod};
use crate::probe::{ProbeResult, RelayType};
use crate::score::{Confidence, Scores};
use crate::ASSERTION_KIND;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssertionStatus {
    Evaluated,
    InsufficientData,
    Unreachable,
    /// Operator-blocklisted relay; never derived by the scorer itself.
    Blocked,
}

impl AssertionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssertionStatus::Evaluated => "evaluated",
            AssertionStatus::InsufficientData => "insufficient_data",
            AssertionStatus::Unreachable => "unreachable",
            AssertionStatus::Blocked => "blocked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "evaluated" => AssertionStatus::Evaluated,
            "insufficient_data" => AssertionStatus::InsufficientData,
            "unreachable" => AssertionStatus::Unreachable,
            "blocked" => AssertionStatus::Blocked,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Network {
    Clearnet,
    Tor,
    I2p,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Clearnet => "clearnet",
            Network::Tor => "tor",
            Network::I2p => "i2p",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "clearnet" => Network::Clearnet,
            "tor" => Network::Tor,
            "i2p" => Network::I2p,
            _ => return None,
        })
    }

    pub fn from_url(url: &NormRelayUrl) -> Self {
        let host = url.host();
        if host.ends_with(".onion") {
            Network::Tor
        } else if host.ends_with(".i2p") {
            Network::I2p
        } else {
            Network::Clearnet
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    Open,
    Moderated,
    Curated,
    Specialized,
}

impl Policy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Policy::Open => "open",
            Policy::Moderated => "moderated",
            Policy::Curated => "curated",
            Policy::Specialized => "specialized",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "open" => Policy::Open,
            "moderated" => Policy::Moderated,
            "curated" => Policy::Curated,
            "specialized" => Policy::Specialized,
            _ => return None,
        })
    }
}

/// Scoring algorithm identity, stamped into every assertion so consumers
/// can tell which formula produced the numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlgorithmMeta {
    pub name: String,
    pub url: String,
}

impl Default for AlgorithmMeta {
    fn default() -> Self {
        AlgorithmMeta {
            name: format!("relaywatch-{}", env!("CARGO_PKG_VERSION")),
            url: "https://github.com/relaywatch/relaywatch/blob/master/SCORING.md".to_string(),
        }
    }
}

/// The externally visible record describing one relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayAssertion {
    pub relay_url: NormRelayUrl,
    pub status: AssertionStatus,
    pub score: u8,
    pub reliability: u8,
    pub quality: Option<u8>,
    pub accessibility: Option<u8>,
    pub confidence: Confidence,
    /// weighted observation count, rounded
    pub observations: u64,
    /// `"Nd"` or `"<1d"`
    pub observation_period: String,
    pub first_seen: u64,
    pub operator: Option<Pubkey>,
    pub operator_verified: Option<VerificationMethod>,
    pub operator_confidence: Option<u8>,
    pub operator_trust: Option<u8>,
    pub policy: Option<Policy>,
    pub policy_confidence: Option<u8>,
    pub country_code: Option<String>,
    pub region: Option<String>,
    pub is_hosting: Option<bool>,
    pub network: Network,
    pub algorithm: String,
    pub algorithm_url: String,
}

/// Status is recoverability-first: a relay that failed its latest probe is
/// `unreachable` no matter how much history it has.
pub fn assertion_status(probes: &[ProbeResult], weighted_observations: f64) -> AssertionStatus {
    if let Some(latest) = probes.last() {
        if !latest.reachable {
            return AssertionStatus::Unreachable;
        }
    }
    if weighted_observations < 10.0 {
        return AssertionStatus::InsufficientData;
    }
    AssertionStatus::Evaluated
}

pub fn observation_period(now: u64, first_seen: u64) -> String {
    let days = now.saturating_sub(first_seen) / 86_400;
    if days < 1 {
        "<1d".to_string()
    } else {
        format!("{days}d")
    }
}

/// Write-policy classification from the relay's self-description.
pub fn classify_policy(
    nip11: Option<&Nip11Info>,
    relay_type: RelayType,
    reports: Option<u64>,
) -> (Policy, u8) {
    let policy_confidence = match nip11 {
        Some(info) if info.limitation.is_some() => 80,
        Some(_) => 50,
        None => 30,
    };

    let narrow_nips = nip11
        .and_then(|i| i.supported_nips.as_ref())
        .map(|n| !n.is_empty() && n.len() < 5)
        .unwrap_or(false);

    let policy = if relay_type == RelayType::Nip46
        || narrow_nips
        || nip11.map(|i| i.restricted_writes()).unwrap_or(false)
    {
        Policy::Specialized
    } else if nip11
        .map(|i| i.auth_required() || i.payment_required())
        .unwrap_or(false)
    {
        Policy::Curated
    } else if reports.unwrap_or(0) > 0
        || nip11.and_then(|i| i.posting_policy.as_ref()).is_some()
    {
        Policy::Moderated
    } else {
        Policy::Open
    };

    (policy, policy_confidence)
}

/// Everything the builder fuses into one assertion.
pub struct AssertionContext<'a> {
    pub url: &'a NormRelayUrl,
    pub probes: &'a [ProbeResult],
    pub scores: &'a Scores,
    pub operator: Option<&'a OperatorResolution>,
    /// count of abuse/moderation reports seen for this relay
    pub reports: Option<u64>,
    pub jurisdiction: Option<&'a JurisdictionInfo>,
    pub algorithm: &'a AlgorithmMeta,
    pub now: u64,
}

/// Pure fusion of probe history, scores, operator resolution and
/// jurisdiction into the published record.
pub fn build_assertion(ctx: &AssertionContext<'_>) -> RelayAssertion {
    let latest_nip11 = ctx.probes.iter().rev().find_map(|p| p.nip11.as_ref());
    let relay_type = ctx
        .probes
        .iter()
        .rev()
        .find(|p| p.reachable)
        .map(|p| p.relay_type)
        .unwrap_or(RelayType::Unknown);

    let (policy, policy_confidence) = classify_policy(latest_nip11, relay_type, ctx.reports);

    let (operator, operator_verified, operator_confidence, operator_trust) = match ctx.operator {
        Some(res) => (
            res.operator,
            res.operator.map(|_| res.method),
            res.operator.map(|_| res.confidence),
            res.trust_score,
        ),
        None => (None, None, None, None),
    };

    RelayAssertion {
        relay_url: ctx.url.clone(),
        status: assertion_status(ctx.probes, ctx.scores.weighted_observations),
        score: ctx.scores.overall,
        reliability: ctx.scores.reliability,
        quality: Some(ctx.scores.quality),
        accessibility: Some(ctx.scores.accessibility),
        confidence: ctx.scores.confidence,
        observations: ctx.scores.weighted_observations.round().max(0.0) as u64,
        observation_period: observation_period(ctx.now, ctx.scores.first_seen),
        first_seen: ctx.scores.first_seen,
        operator,
        operator_verified,
        operator_confidence,
        operator_trust,
        policy: Some(policy),
        policy_confidence: Some(policy_confidence),
        country_code: ctx.jurisdiction.map(|j| j.country_code.clone()),
        region: ctx.jurisdiction.and_then(|j| j.region.clone()),
        is_hosting: ctx.jurisdiction.map(|j| j.is_hosting),
        network: Network::from_url(ctx.url),
        algorithm: ctx.algorithm.name.clone(),
        algorithm_url: ctx.algorithm.url.clone(),
    }
}

impl RelayAssertion {
    /// Event tag form, emitted in a fixed order. Tags are an ordered list
    /// of string lists; position within each tag is significant.
    pub fn to_tags(&self) -> Vec<Vec<String>> {
        let mut tags: Vec<Vec<String>> = Vec::new();

        let mut tag = |name: &str, value: String| {
            tags.push(vec![name.to_string(), value]);
        };

        tag("d", self.relay_url.as_str().to_string());
        tag("status", self.status.as_str().to_string());
        tag("algorithm", self.algorithm.clone());
        tag("algorithm_url", self.algorithm_url.clone());
        tag("score", self.score.to_string());
        tag("reliability", self.reliability.to_string());
        if let Some(quality) = self.quality {
            tag("quality", quality.to_string());
        }
        if let Some(accessibility) = self.accessibility {
            tag("accessibility", accessibility.to_string());
        }
        tag("confidence", self.confidence.as_str().to_string());
        tag("observations", self.observations.to_string());
        tag("observation_period", self.observation_period.clone());
        tag("first_seen", self.first_seen.to_string());
        if let Some(operator) = &self.operator {
            tag("operator", operator.hex());
        }
        if let Some(method) = &self.operator_verified {
            tag("operator_verified", method.as_str().to_string());
        }
        if let Some(confidence) = self.operator_confidence {
            tag("operator_confidence", confidence.to_string());
        }
        if let Some(trust) = self.operator_trust {
            tag("operator_trust", trust.to_string());
        }
        if let Some(policy) = &self.policy {
            tag("policy", policy.as_str().to_string());
        }
        if let Some(confidence) = self.policy_confidence {
            tag("policy_confidence", confidence.to_string());
        }
        if let Some(country) = &self.country_code {
            tag("country_code", country.clone());
        }
        if let Some(region) = &self.region {
            tag("region", region.clone());
        }
        if let Some(hosting) = self.is_hosting {
            tag("is_hosting", hosting.to_string());
        }
        tag("network", self.network.as_str().to_string());

        tags
    }

    pub fn to_unsigned_event(&self, author: Pubkey, created_at: u64) -> UnsignedEvent {
        UnsignedEvent {
            pubkey: author,
            created_at,
            kind: ASSERTION_KIND,
            tags: self.to_tags(),
            content: String::new(),
        }
    }

    /// Rebuild an assertion from event tags. Inverse of [`Self::to_tags`].
    pub fn from_tags(tags: &[Vec<String>]) -> Result<Self, Error> {
        let value = |name: &str| -> Option<&str> {
            tags.iter()
                .find(|t| t.first().map(String::as_str) == Some(name))
                .and_then(|t| t.get(1))
                .map(String::as_str)
        };
        let required = |name: &str| -> Result<&str, Error> {
            value(name).ok_or_else(|| Error::Generic(format!("missing {name} tag")))
        };
        let parse_u8 = |name: &str| -> Result<Option<u8>, Error> {
            value(name)
                .map(|v| {
                    v.parse::<u8>()
                        .map_err(|_| Error::Generic(format!("bad {name} tag")))
                })
                .transpose()
        };

        let relay_url = NormRelayUrl::parse(required("d")?)
            .map_err(|_| Error::Generic("bad d tag".to_string()))?;
        let status = AssertionStatus::parse(required("status")?)
            .ok_or_else(|| Error::Generic("bad status tag".to_string()))?;
        let confidence = Confidence::parse(required("confidence")?)
            .ok_or_else(|| Error::Generic("bad confidence tag".to_string()))?;
        let network = value("network")
            .and_then(Network::parse)
            .unwrap_or(Network::Clearnet);

        Ok(RelayAssertion {
            relay_url,
            status,
            score: parse_u8("score")?
                .ok_or_else(|| Error::Generic("missing score tag".to_string()))?,
            reliability: parse_u8("reliability")?
                .ok_or_else(|| Error::Generic("missing reliability tag".to_string()))?,
            quality: parse_u8("quality")?,
            accessibility: parse_u8("accessibility")?,
            confidence,
            observations: required("observations")?
                .parse()
                .map_err(|_| Error::Generic("bad observations tag".to_string()))?,
            observation_period: required("observation_period")?.to_string(),
            first_seen: required("first_seen")?
                .parse()
                .map_err(|_| Error::Generic("bad first_seen tag".to_string()))?,
            operator: value("operator")
                .map(Pubkey::from_hex)
                .transpose()
                .map_err(|_| Error::Generic("bad operator tag".to_string()))?,
            operator_verified: value("operator_verified").and_then(VerificationMethod::parse),
            operator_confidence: parse_u8("operator_confidence")?,
            operator_trust: parse_u8("operator_trust")?,
            policy: value("policy").and_then(Policy::parse),
            policy_confidence: parse_u8("policy_confidence")?,
            country_code: value("country_code").map(str::to_string),
            region: value("region").map(str::to_string),
            is_hosting: value("is_hosting").map(|v| v == "true"),
            network,
            algorithm: required("algorithm")?.to_string(),
            algorithm_url: required("algorithm_url")?.to_string(),
        })
    }
}
