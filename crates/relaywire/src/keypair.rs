use crate::{Error, Pubkey};

pub use nostr::SecretKey;

/// A keypair with the secret present. Publishers are constructed from one
/// of these; probing and ingest never need a secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullKeypair {
    pub pubkey: Pubkey,
    pub secret_key: SecretKey,
}

impl FullKeypair {
    pub fn from_secret(secret_key: SecretKey) -> Self {
        let nostr_keys = nostr::Keys::new(secret_key.clone());
        FullKeypair {
            pubkey: Pubkey::new(nostr_keys.public_key().to_bytes()),
            secret_key,
        }
    }

    /// Parse a secret in raw-hex or bech32 (`nsec...`) form. Anything else
    /// fails here, at construction, never at use.
    pub fn parse(s: &str) -> Result<Self, Error> {
        let secret = SecretKey::parse(s).map_err(|_| Error::InvalidSecretKey)?;
        Ok(Self::from_secret(secret))
    }

    pub fn generate() -> Self {
        let mut rng = nostr::secp256k1::rand::rngs::OsRng;
        let (secret_key, _) = &nostr::SECP256K1.generate_keypair(&mut rng);
        let (xopk, _) = secret_key.x_only_public_key(&nostr::SECP256K1);
        let secret_key = nostr::SecretKey::from(*secret_key);
        FullKeypair {
            pubkey: Pubkey::new(xopk.serialize()),
            secret_key,
        }
    }

    pub fn keys(&self) -> nostr::Keys {
        nostr::Keys::new(self.secret_key.clone())
    }
}

impl std::fmt::Display for FullKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Keypair:\n\tpublic: {}\n\tsecret: <hidden>", self.pubkey)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hex_and_nsec_agree() {
        let kp = FullKeypair::generate();
        let hex = kp.secret_key.to_secret_hex();

        let from_hex = FullKeypair::parse(&hex).unwrap();
        assert_eq!(from_hex.pubkey, kp.pubkey);

        use nostr::nips::nip19::ToBech32;
        let nsec = kp.secret_key.to_bech32().unwrap();
        let from_nsec = FullKeypair::parse(&nsec).unwrap();
        assert_eq!(from_nsec.pubkey, kp.pubkey);
    }

    #[test]
    fn parse_rejects_junk() {
        assert!(FullKeypair::parse("not-a-key").is_err());
        assert!(FullKeypair::parse("nsec1qqqqq").is_err());
    }
}
