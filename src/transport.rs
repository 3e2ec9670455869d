//! The panel's side of the relay connection: one WebSocket session whose
//! inbound frames are pumped into the panel event queue and whose outbound
//! frames are drained from an mpsc channel.
//!
//! The session lives as long as the panel. Dropping the outgoing sender
//! closes the connection; a socket error tears it down and surfaces as a
//! `Disconnected` event. There is no reconnection.

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::tui::AppEvent;

pub struct Transport {
    pub outgoing: mpsc::UnboundedSender<String>,
}

/// Connect to the relay and spawn the reader/writer tasks.
pub async fn connect(url: &str, events: mpsc::UnboundedSender<AppEvent>) -> Result<Transport> {
    let (ws, _) = tokio_tungstenite::connect_async(url)
        .await
        .with_context(|| format!("cannot reach the relay at {}", url))?;
    let (mut sink, mut stream) = ws.split();

    let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<String>();

    // Writer: drain outgoing frames until the panel drops its sender.
    tokio::spawn(async move {
        while let Some(text) = outgoing_rx.recv().await {
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    // Reader: deliver inbound text frames as panel events.
    tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    if events.send(AppEvent::Frame(text)).is_err() {
                        return;
                    }
                }
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
        let _ = events.send(AppEvent::Disconnected);
    });

    Ok(Transport { outgoing })
}
