use relaywire::Pubkey;
use serde::{Deserialize, Serialize};

/// How an operator claim was verified, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMethod {
    /// NIP-11 pubkey that also signed a matching attestation
    Nip11Signed,
    Dns,
    Wellknown,
    Nip11,
    Vouched,
    Claimed,
}

impl VerificationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationMethod::Nip11Signed => "nip11_signed",
            VerificationMethod::Dns => "dns",
            VerificationMethod::Wellknown => "wellknown",
            VerificationMethod::Nip11 => "nip11",
            VerificationMethod::Vouched => "vouched",
            VerificationMethod::Claimed => "claimed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "nip11_signed" => VerificationMethod::Nip11Signed,
            "dns" => VerificationMethod::Dns,
            "wellknown" => VerificationMethod::Wellknown,
            "nip11" => VerificationMethod::Nip11,
            "vouched" => VerificationMethod::Vouched,
            "claimed" => VerificationMethod::Claimed,
            _ => return None,
        })
    }

    /// Base confidence contributed by the verification method alone.
    pub fn base_confidence(&self) -> u8 {
        match self {
            VerificationMethod::Nip11Signed => 100,
            VerificationMethod::Dns => 80,
            VerificationMethod::Wellknown => 75,
            VerificationMethod::Nip11 => 70,
            VerificationMethod::Vouched => 50,
            VerificationMethod::Claimed => 20,
        }
    }
}

/// The outcome of resolving who operates a relay. Produced by an external
/// resolver and cached with a TTL; pubkeys are referenced by value, never
/// by pointer, so there is no cycle to worry about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorResolution {
    pub operator: Option<Pubkey>,
    pub method: VerificationMethod,
    /// unix seconds
    pub verified_at: u64,
    /// 0..=100
    pub confidence: u8,
    pub nip11_pubkey: Option<Pubkey>,
    pub dns_pubkey: Option<Pubkey>,
    pub wellknown_pubkey: Option<Pubkey>,
    pub corroborated_sources: Vec<String>,
    pub sources_disagree: bool,
    /// Web-of-trust score 0..=100, when one is known.
    pub trust_score: Option<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_confidence_ordering() {
        let methods = [
            VerificationMethod::Nip11Signed,
            VerificationMethod::Dns,
            VerificationMethod::Wellknown,
            VerificationMethod::Nip11,
            VerificationMethod::Vouched,
            VerificationMethod::Claimed,
        ];
        let confidences: Vec<u8> = methods.iter().map(|m| m.base_confidence()).collect();
        assert_eq!(confidences, vec![100, 80, 75, 70, 50, 20]);

        for m in methods {
            assert_eq!(VerificationMethod::parse(m.as_str()), Some(m));
        }
        assert_eq!(VerificationMethod::parse("psychic"), None);
    }
}
