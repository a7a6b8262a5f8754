use crate::{relay::RelayStatus, ClientMessage, Error, NormRelayUrl};

use std::fmt;

use ewebsock::{Options, WsEvent, WsMessage, WsReceiver, WsSender};
use tracing::{debug, error};

/// An outbound websocket connection to one relay.
pub struct WebsocketConn {
    pub url: NormRelayUrl,
    pub status: RelayStatus,
    sender: WsSender,
    receiver: WsReceiver,
}

impl fmt::Debug for WebsocketConn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebsocketConn")
            .field("url", &self.url)
            .field("status", &self.status)
            .finish()
    }
}

impl WebsocketConn {
    pub fn new(
        url: NormRelayUrl,
        wakeup: impl Fn() + Send + Sync + 'static,
    ) -> Result<Self, Error> {
        let (sender, receiver) =
            ewebsock::connect_with_wakeup(url.as_str(), Options::default(), wakeup)
                .map_err(Error::Websocket)?;

        Ok(Self {
            url,
            status: RelayStatus::Connecting,
            sender,
            receiver,
        })
    }

    /// Replace the underlying socket with a fresh connection attempt.
    pub fn reconnect(&mut self, wakeup: impl Fn() + Send + Sync + 'static) -> Result<(), Error> {
        let (sender, receiver) =
            ewebsock::connect_with_wakeup(self.url.as_str(), Options::default(), wakeup)
                .map_err(Error::Websocket)?;
        self.status = RelayStatus::Connecting;
        self.sender = sender;
        self.receiver = receiver;
        Ok(())
    }

    pub fn send(&mut self, msg: &ClientMessage) {
        let json = match msg.to_json() {
            Ok(json) => {
                debug!("sending {} to {}", json, self.url);
                json
            }
            Err(e) => {
                error!("error serializing client message: {e}");
                return;
            }
        };

        self.sender.send(WsMessage::Text(json));
    }

    /// Poll for the next socket event, keeping connection status current
    /// and answering pings.
    pub fn try_recv(&mut self) -> Option<WsEvent> {
        let event = self.receiver.try_recv()?;

        match &event {
            WsEvent::Opened => {
                self.status = RelayStatus::Connected;
            }
            WsEvent::Closed => {
                self.status = RelayStatus::Disconnected;
            }
            WsEvent::Error(err) => {
                error!("websocket error on {}: {}", self.url, err);
                self.status = RelayStatus::Disconnected;
            }
            WsEvent::Message(msg) => {
                if let WsMessage::Ping(bs) = msg {
                    debug!("pong {}", self.url);
                    self.sender.send(WsMessage::Pong(bs.to_owned()));
                }
            }
        }

        Some(event)
    }

    pub fn ping(&mut self) {
        self.sender.send(WsMessage::Ping(vec![]));
    }

    pub fn is_connected(&self) -> bool {
        self.status == RelayStatus::Connected
    }
}
