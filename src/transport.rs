// src/transport.rs - WebSocket transport adapted to text-frame channels
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket connect failed: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Both directions of a message-oriented connection. The session only sees
/// these channels; the inbound side closes when the socket does.
pub struct TransportChannels {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<String>,
}

impl TransportChannels {
    /// In-memory pair: returns the session side and the peer side.
    pub fn pair() -> (TransportChannels, TransportChannels) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            TransportChannels { outbound: a_tx, inbound: b_rx },
            TransportChannels { outbound: b_tx, inbound: a_rx },
        )
    }
}

pub async fn connect_websocket(url: &str) -> Result<TransportChannels, TransportError> {
    let (socket, _response) = tokio_tungstenite::connect_async(url).await?;
    info!("Connected to {}", url);

    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if let Err(e) = sink.send(Message::Text(text)).await {
                warn!("WebSocket send failed: {}", e);
                break;
            }
        }
        let _ = sink.close().await;
    });

    tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(_) => {
                        debug!("Dropping non-UTF-8 binary frame");
                        continue;
                    }
                },
                Ok(Message::Close(frame)) => {
                    info!("WebSocket closed by peer: {:?}", frame);
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    warn!("WebSocket receive failed: {}", e);
                    break;
                }
            };
            if in_tx.send(text).is_err() {
                break;
            }
        }
    });

    Ok(TransportChannels {
        outbound: out_tx,
        inbound: in_rx,
    })
}
