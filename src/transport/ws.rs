// Websocket connector
//
// One pump task per socket. The pump owns the stream, forwards inbound text
// frames as tagged console events, and writes whatever the console queues on
// the outbound channel. Reconnection is the console's decision, not the pump's.

use super::{Connector, Outbound, SocketChannel, SocketHandle, TransportError};
use crate::events::ConsoleEvent;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, Clone)]
pub struct WsConnector {
    ws_url: String,
}

impl WsConnector {
    /// `ws_url` is the socket origin, e.g. `ws://localhost:8000`
    pub fn new(ws_url: &str) -> Self {
        Self {
            ws_url: ws_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn url_for(&self, channel: SocketChannel) -> String {
        format!("{}{}", self.ws_url, channel.path())
    }
}

impl Connector for WsConnector {
    fn open(&self, channel: SocketChannel, events: mpsc::Sender<ConsoleEvent>) -> SocketHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let url = self.url_for(channel);
        let task = tokio::spawn(pump(url, channel, events, rx));
        SocketHandle::new(tx, task)
    }
}

async fn pump(
    url: String,
    channel: SocketChannel,
    events: mpsc::Sender<ConsoleEvent>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    tracing::debug!(?channel, "Connecting to {}", url);
    let (mut ws, _) = match connect_async(url.as_str()).await {
        Ok(value) => value,
        Err(err) => {
            let err = TransportError::from(err);
            tracing::warn!(?channel, "Socket connect failed: {}", err);
            let _ = events.send(channel.closed(Some(err.to_string()))).await;
            return;
        }
    };
    if events.send(channel.opened()).await.is_err() {
        let _ = ws.close(None).await;
        return;
    }

    let reason = loop {
        tokio::select! {
            inbound = ws.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    if events.send(channel.message(text)).await.is_err() {
                        // Console is gone
                        let _ = ws.close(None).await;
                        return;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    break frame.map(|f| f.reason.into_owned()).filter(|r| !r.is_empty());
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => break Some(TransportError::from(err).to_string()),
                None => break None,
            },
            queued = outbound.recv() => match queued {
                Some(Outbound::Text(text)) => {
                    if let Err(err) = ws.send(Message::Text(text)).await {
                        break Some(err.to_string());
                    }
                }
                // Local close: no event, the console already forgot this socket
                Some(Outbound::Close) | None => {
                    let _ = ws.close(None).await;
                    tracing::debug!(?channel, "Socket closed locally");
                    return;
                }
            },
        }
    };

    tracing::debug!(?channel, ?reason, "Socket closed by remote");
    let _ = events.send(channel.closed(reason)).await;
}
