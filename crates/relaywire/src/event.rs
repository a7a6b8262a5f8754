use crate::{bytes32, Error, Pubkey};

use nostr::JsonUtil;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};

static HRP_NOTE: bech32::Hrp = bech32::Hrp::parse_unchecked("note");

/// Sha256 of the canonical event form. Hex on the wire, `note1...` when
/// shown to people.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct EventId {
    bytes: [u8; 32],
}

impl EventId {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    pub fn from_hex(s: &str) -> Result<Self, Error> {
        Ok(Self {
            bytes: bytes32::from_hex(s)?,
        })
    }

    pub fn bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    pub fn hex(&self) -> String {
        hex::encode(self.bytes)
    }

    pub fn note(&self) -> Option<String> {
        bytes32::to_bech32(HRP_NOTE, &self.bytes)
    }
}

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EventId").field(&self.hex()).finish()
    }
}

/// A signed Nostr event as received from or sent to a relay.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Event {
    /// 32-byte sha256 of the serialized event data
    pub id: EventId,
    /// 32-byte public key of the event creator
    pub pubkey: Pubkey,
    /// unix timestamp in seconds
    pub created_at: u64,
    pub kind: u64,
    /// Ordered tag bag. The wire format is position-significant within
    /// each tag, so this is never a map.
    pub tags: Vec<Vec<String>>,
    pub content: String,
    /// 64-byte schnorr signature over the event id
    pub sig: String,
}

impl Hash for Event {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.bytes().hash(state);
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Event {}

impl Event {
    pub fn from_json(s: &str) -> Result<Self, Error> {
        serde_json::from_str(s).map_err(Into::into)
    }

    pub fn json(&self) -> Result<String, Error> {
        serde_json::to_string(self).map_err(Into::into)
    }

    /// First value of the first tag with the given name.
    pub fn tag_value<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        self.tags_named(name)
            .next()
            .and_then(|t| t.get(1))
            .map(|s| s.as_str())
    }

    pub fn tags_named<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a Vec<String>> + 'a {
        self.tags
            .iter()
            .filter(move |t| t.first().map(|s| s.as_str()) == Some(name))
    }

    pub fn verify(&self) -> Result<(), Error> {
        verify_event_json(&self.json()?)
    }
}

impl std::str::FromStr for Event {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        Event::from_json(s)
    }
}

/// Check id and schnorr signature of a raw event, without keeping the
/// parsed form around.
pub fn verify_event_json(json: &str) -> Result<(), Error> {
    let ev = nostr::Event::from_json(json).map_err(|_| Error::DecodeFailed)?;
    ev.verify().map_err(|_| Error::InvalidSignature)
}

/// An event that has not been signed yet. [`UnsignedEvent::sign`] produces
/// the canonical signed form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedEvent {
    pub pubkey: Pubkey,
    pub created_at: u64,
    pub kind: u64,
    pub tags: Vec<Vec<String>>,
    pub content: String,
}

impl UnsignedEvent {
    pub fn sign(&self, keys: &nostr::Keys) -> Result<Event, Error> {
        let mut tags: Vec<nostr::Tag> = Vec::with_capacity(self.tags.len());
        for tag in &self.tags {
            tags.push(nostr::Tag::parse(tag).map_err(|_| Error::DecodeFailed)?);
        }

        let signed = nostr::EventBuilder::new(nostr::Kind::Custom(self.kind as u16), self.content.as_str())
            .tags(tags)
            .custom_created_at(nostr::Timestamp::from(self.created_at))
            .sign_with_keys(keys)
            .map_err(|e| Error::Generic(e.to_string()))?;

        Event::from_json(&signed.as_json())
    }
}

impl Serialize for EventId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.hex())
    }
}

impl<'de> Deserialize<'de> for EventId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        EventId::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
