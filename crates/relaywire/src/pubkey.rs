use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::bytes32;
use crate::Error;

static HRP_NPUB: bech32::Hrp = bech32::Hrp::parse_unchecked("npub");

/// An x-only schnorr public key.
///
/// [`Pubkey::parse`] is for operator-supplied strings (config, CLI,
/// trust sets) and checks the point is actually on the curve, so a
/// parsed key is known-usable. Identities arriving inside events go
/// through [`Pubkey::from_hex`] instead, which skips the curve check:
/// signature verification already rejects events with a bogus author.
#[derive(Eq, PartialEq, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct Pubkey {
    bytes: [u8; 32],
}

impl Pubkey {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Parse an operator-supplied key, hex or `npub`, and reject
    /// anything that is not a valid curve point.
    pub fn parse(s: &str) -> Result<Self, Error> {
        let bytes = if s.len() == 64 && !s.starts_with("npub1") {
            bytes32::from_hex(s)?
        } else {
            bytes32::from_bech32(s, HRP_NPUB)?
        };

        if nostr::secp256k1::XOnlyPublicKey::from_slice(&bytes).is_err() {
            return Err(Error::InvalidPublicKey);
        }

        Ok(Self { bytes })
    }

    /// Decode the hex wire form without the curve check.
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

    pub fn npub(&self) -> Option<String> {
        bytes32::to_bech32(HRP_NPUB, &self.bytes)
    }
}

impl fmt::Display for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex())
    }
}

impl fmt::Debug for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex())
    }
}

impl Serialize for Pubkey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.hex())
    }
}

impl<'de> Deserialize<'de> for Pubkey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Pubkey::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
