use crate::Error;
use serde::Serialize;

/// A NIP-01 subscription filter. Only the fields the monitor actually
/// sends are modeled; the JSON shape matches the wire format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Filter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl Filter {
    pub fn new() -> Self {
        Filter::default()
    }

    pub fn kinds(mut self, kinds: Vec<u64>) -> Self {
        self.kinds = Some(kinds);
        self
    }

    pub fn authors(mut self, authors: Vec<String>) -> Self {
        self.authors = Some(authors);
        self
    }

    pub fn since(mut self, since: u64) -> Self {
        self.since = Some(since);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn json(&self) -> Result<String, Error> {
        serde_json::to_string(self).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_elides_empty_fields() {
        let json = Filter::new().kinds(vec![30166]).limit(1000).json().unwrap();
        assert_eq!(json, r#"{"kinds":[30166],"limit":1000}"#);
    }

    #[test]
    fn json_with_authors() {
        let json = Filter::new()
            .kinds(vec![30166])
            .authors(vec!["ab".into(), "cd".into()])
            .json()
            .unwrap();
        assert_eq!(json, r#"{"kinds":[30166],"authors":["ab","cd"]}"#);
    }
}
