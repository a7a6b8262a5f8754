use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Intelligence-sharing groupings, used as a surveillance-risk proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alliance {
    PrivacyFriendly,
    NonAligned,
    FourteenEyes,
    NineEyes,
    FiveEyes,
    Unknown,
}

impl Alliance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Alliance::PrivacyFriendly => "privacy_friendly",
            Alliance::NonAligned => "non_aligned",
            Alliance::FourteenEyes => "fourteen_eyes",
            Alliance::NineEyes => "nine_eyes",
            Alliance::FiveEyes => "five_eyes",
            Alliance::Unknown => "unknown",
        }
    }
}

/// Country reference data: per-country internet-freedom ratings and
/// alliance membership. Pure lookup tables, loaded from configuration and
/// injected wherever jurisdiction scoring happens.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CountryIntel {
    /// ISO-3166-1 alpha-2 → freedom score 0..=100
    #[serde(default)]
    freedom_scores: HashMap<String, u8>,
    /// ISO-3166-1 alpha-2 → alliance
    #[serde(default)]
    alliances: HashMap<String, Alliance>,
}

impl CountryIntel {
    pub fn new() -> Self {
        CountryIntel::default()
    }

    pub fn from_json(s: &str) -> Option<Self> {
        serde_json::from_str(s).ok()
    }

    pub fn set_freedom_score(&mut self, country: &str, score: u8) {
        self.freedom_scores
            .insert(country.to_ascii_uppercase(), score.min(100));
    }

    pub fn set_alliance(&mut self, country: &str, alliance: Alliance) {
        self.alliances
            .insert(country.to_ascii_uppercase(), alliance);
    }

    pub fn freedom_score(&self, country: &str) -> Option<u8> {
        self.freedom_scores.get(&country.to_ascii_uppercase()).copied()
    }

    pub fn alliance(&self, country: &str) -> Alliance {
        self.alliances
            .get(&country.to_ascii_uppercase())
            .copied()
            .unwrap_or(Alliance::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_are_case_insensitive() {
        let mut intel = CountryIntel::new();
        intel.set_freedom_score("is", 94);
        intel.set_alliance("US", Alliance::FiveEyes);

        assert_eq!(intel.freedom_score("IS"), Some(94));
        assert_eq!(intel.freedom_score("de"), None);
        assert_eq!(intel.alliance("us"), Alliance::FiveEyes);
        assert_eq!(intel.alliance("xx"), Alliance::Unknown);
    }

    #[test]
    fn loads_from_json() {
        let intel = CountryIntel::from_json(
            r#"{"freedom_scores":{"DE":77},"alliances":{"DE":"fourteen_eyes"}}"#,
        )
        .unwrap();
        assert_eq!(intel.freedom_score("DE"), Some(77));
        assert_eq!(intel.alliance("DE"), Alliance::FourteenEyes);
    }
}
