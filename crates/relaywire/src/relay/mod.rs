mod conn;
pub mod message;
pub mod pool;
mod url;

pub use conn::WebsocketConn;
pub use pool::{PoolEvent, PoolRelay, PublishOutcome, RelayPool, RelayPublishResult};
pub use url::NormRelayUrl;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RelayStatus {
    Connected,
    Connecting,
    Disconnected,
}
