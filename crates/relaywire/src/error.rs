use std::fmt;

#[derive(Debug)]
pub enum Error {
    Empty,
    DecodeFailed,
    HexDecodeFailed,
    InvalidBech32,
    InvalidByteSize,
    InvalidSignature,
    InvalidPublicKey,
    InvalidSecretKey,
    InvalidRelayUrl,
    DuplicatePublish,
    Websocket(String),
    Json(serde_json::Error),
    Generic(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "message is empty"),
            Self::DecodeFailed => write!(f, "decoding failed"),
            Self::HexDecodeFailed => write!(f, "hex decoding failed"),
            Self::InvalidBech32 => write!(f, "invalid bech32 string"),
            Self::InvalidByteSize => write!(f, "invalid byte size"),
            Self::InvalidSignature => write!(f, "invalid signature"),
            Self::InvalidPublicKey => write!(f, "invalid public key"),
            Self::InvalidSecretKey => write!(f, "invalid secret key"),
            Self::InvalidRelayUrl => write!(f, "invalid relay url"),
            Self::DuplicatePublish => write!(f, "event already in flight"),
            Self::Websocket(e) => write!(f, "websocket: {e}"),
            Self::Json(e) => write!(f, "{e}"),
            Self::Generic(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Generic(s)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}
