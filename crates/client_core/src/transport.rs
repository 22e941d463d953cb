use anyhow::{anyhow, Context, Result};
use futures::{SinkExt, StreamExt};
use shared::protocol::{ClientMessage, ServerEvent};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("relay connection is closed")]
pub struct RelayClosed;

/// Cloneable outbound half of a [`RelayConnection`].
#[derive(Debug, Clone)]
pub struct RelaySender {
    tx: mpsc::UnboundedSender<ClientMessage>,
}

impl RelaySender {
    pub fn send(&self, message: ClientMessage) -> Result<(), RelayClosed> {
        self.tx.send(message).map_err(|_| RelayClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A live link to the relay. The inbound side yielding `None` means the
/// transport is gone; reconnecting is the caller's job.
pub struct RelayConnection {
    sender: RelaySender,
    inbound: mpsc::UnboundedReceiver<ServerEvent>,
}

impl RelayConnection {
    pub fn from_channels(
        outbound: mpsc::UnboundedSender<ClientMessage>,
        inbound: mpsc::UnboundedReceiver<ServerEvent>,
    ) -> Self {
        Self {
            sender: RelaySender { tx: outbound },
            inbound,
        }
    }

    pub async fn connect(server_url: &str) -> Result<Self> {
        let ws_url = ws_url(server_url)?;
        let (ws_stream, _) = connect_async(ws_url.as_str())
            .await
            .with_context(|| format!("failed to connect websocket: {ws_url}"))?;
        info!(%ws_url, "connected to relay");
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ClientMessage>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let writer = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let text = match serde_json::to_string(&message) {
                    Ok(v) => v,
                    Err(err) => {
                        warn!(kind = message.kind(), error = %err, "failed to encode message");
                        continue;
                    }
                };
                if let Err(err) = ws_writer.send(Message::Text(text)).await {
                    warn!(error = %err, "websocket send failed");
                    break;
                }
            }
            let _ = ws_writer.close().await;
        });

        tokio::spawn(async move {
            while let Some(frame) = ws_reader.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(event) => {
                            if inbound_tx.send(event).is_err() {
                                break;
                            }
                        }
                        Err(err) => warn!(error = %err, "ignoring unrecognised relay frame"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        warn!(error = %err, "websocket receive failed");
                        break;
                    }
                }
            }
            debug!("relay reader finished");
            writer.abort();
        });

        Ok(Self::from_channels(outbound_tx, inbound_rx))
    }

    pub fn send(&self, message: ClientMessage) -> Result<(), RelayClosed> {
        self.sender.send(message)
    }

    pub async fn next_event(&mut self) -> Option<ServerEvent> {
        self.inbound.recv().await
    }

    pub fn into_parts(self) -> (RelaySender, mpsc::UnboundedReceiver<ServerEvent>) {
        (self.sender, self.inbound)
    }
}

/// Maps an `http(s)://` or `ws(s)://` server URL to the relay's websocket endpoint.
pub fn ws_url(server_url: &str) -> Result<Url> {
    let mut url = Url::parse(server_url.trim())
        .with_context(|| format!("invalid server url: {server_url}"))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(anyhow!("unsupported server url scheme '{other}'")),
    };
    url.set_scheme(scheme)
        .map_err(|_| anyhow!("cannot use scheme '{scheme}' for {server_url}"))?;
    if !url.path().ends_with("/ws") {
        let path = format!("{}/ws", url.path().trim_end_matches('/'));
        url.set_path(&path);
    }
    Ok(url)
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
