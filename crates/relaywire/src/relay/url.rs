use std::fmt::{self, Display};

use url::Url;

use crate::Error;

/// A relay URL in normalized form: lowercased scheme and host, default
/// port elided, trailing slash stripped. Every cross-component lookup keys
/// on this form, so normalization happens exactly once, here.
#[derive(Eq, PartialEq, Hash, Clone, Debug, PartialOrd, Ord)]
pub struct NormRelayUrl {
    url: String,
}

impl NormRelayUrl {
    pub fn parse(input: &str) -> Result<Self, Error> {
        let parsed = Url::parse(input.trim()).map_err(|_| Error::InvalidRelayUrl)?;

        let scheme = parsed.scheme().to_ascii_lowercase();
        if scheme != "ws" && scheme != "wss" {
            return Err(Error::InvalidRelayUrl);
        }

        let host = parsed
            .host_str()
            .ok_or(Error::InvalidRelayUrl)?
            .to_ascii_lowercase();

        let default_port = if scheme == "wss" { 443 } else { 80 };
        let mut url = format!("{scheme}://{host}");
        if let Some(port) = parsed.port().filter(|p| *p != default_port) {
            url.push(':');
            url.push_str(&port.to_string());
        }

        let path = parsed.path().trim_end_matches('/');
        if !path.is_empty() {
            url.push_str(path);
        }

        Ok(Self { url })
    }

    pub fn as_str(&self) -> &str {
        &self.url
    }

    pub fn scheme(&self) -> &str {
        self.url.split("://").next().unwrap_or("")
    }

    pub fn is_tls(&self) -> bool {
        self.scheme() == "wss"
    }

    /// Hostname without port or path, for DNS lookups.
    pub fn host(&self) -> &str {
        let rest = match self.url.find("://") {
            Some(i) => &self.url[i + 3..],
            None => &self.url,
        };
        let end = rest.find([':', '/']).unwrap_or(rest.len());
        &rest[..end]
    }

    pub fn port(&self) -> u16 {
        let rest = match self.url.find("://") {
            Some(i) => &self.url[i + 3..],
            None => &self.url,
        };
        let authority = &rest[..rest.find('/').unwrap_or(rest.len())];
        authority
            .rsplit_once(':')
            .and_then(|(_, p)| p.parse().ok())
            .unwrap_or(if self.is_tls() { 443 } else { 80 })
    }

    /// The matching http(s) URL for NIP-11 fetches.
    pub fn http_url(&self) -> String {
        if self.is_tls() {
            format!("https://{}", &self.url["wss://".len()..])
        } else {
            format!("http://{}", &self.url["ws://".len()..])
        }
    }
}

impl Display for NormRelayUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

impl serde::Serialize for NormRelayUrl {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.url)
    }
}

impl<'de> serde::Deserialize<'de> for NormRelayUrl {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        NormRelayUrl::parse(&s).map_err(serde::de::Error::custom)
    }
}

impl From<NormRelayUrl> for String {
    fn from(value: NormRelayUrl) -> Self {
        value.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn normalizes_case_port_and_slash() {
        let cases = [
            ("WSS://Relay.Example.COM/", "wss://relay.example.com"),
            ("wss://relay.example.com:443", "wss://relay.example.com"),
            ("ws://relay.example.com:80/", "ws://relay.example.com"),
            ("wss://relay.example.com:7777", "wss://relay.example.com:7777"),
            ("wss://relay.example.com/inbox/", "wss://relay.example.com/inbox"),
        ];
        for (input, want) in cases {
            assert_eq!(NormRelayUrl::parse(input).unwrap().as_str(), want, "{input}");
        }
    }

    #[test]
    fn normalization_is_idempotent() {
        let once = NormRelayUrl::parse("WSS://Relay.Example.COM:443/foo/").unwrap();
        let twice = NormRelayUrl::parse(once.as_str()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn rejects_non_websocket_schemes() {
        assert!(NormRelayUrl::parse("https://example.com").is_err());
        assert!(NormRelayUrl::parse("not a url").is_err());
    }

    #[test]
    fn host_and_port_accessors() {
        let url = NormRelayUrl::parse("wss://relay.example.com:7777/sub").unwrap();
        assert_eq!(url.host(), "relay.example.com");
        assert_eq!(url.port(), 7777);
        assert!(url.is_tls());

        let plain = NormRelayUrl::parse("ws://relay.example.com").unwrap();
        assert_eq!(plain.port(), 80);
        assert!(!plain.is_tls());
    }

    #[test]
    fn http_url_for_nip11() {
        let url = NormRelayUrl::parse("wss://relay.example.com").unwrap();
        assert_eq!(url.http_url(), "https://relay.example.com");
        let plain = NormRelayUrl::parse("ws://localhost:8080").unwrap();
        assert_eq!(plain.http_url(), "http://localhost:8080");
    }
}
