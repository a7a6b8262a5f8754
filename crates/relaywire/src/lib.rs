mod bytes32;
mod client;
mod error;
mod event;
mod filter;
mod keypair;
mod pubkey;
mod relay;
mod subid;

pub use client::ClientMessage;
pub use error::Error;
pub use event::{verify_event_json, Event, EventId, UnsignedEvent};
pub use ewebsock;
pub use filter::Filter;
pub use keypair::{FullKeypair, SecretKey};
pub use nostr;
pub use pubkey::Pubkey;
pub use relay::message::{CommandResult, RelayEvent, RelayMessage};
pub use relay::{
    NormRelayUrl, PoolEvent, PoolRelay, PublishOutcome, RelayPool, RelayPublishResult,
    RelayStatus, WebsocketConn,
};
pub use subid::SubId;

pub type Result<T> = std::result::Result<T, error::Error>;
