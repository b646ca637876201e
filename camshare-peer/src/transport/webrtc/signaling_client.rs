use crate::error::{TransportError, TransportErrorKind};
use crate::transport::webrtc::signaling_message::SignalMessage;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};
use url::Url;

/// What one signaling socket reports to its owner. `epoch` tells sockets of
/// successive reconnects apart.
#[derive(Debug)]
pub(crate) enum SocketEvent {
    Frame { epoch: u64, message: SignalMessage },
    Closed { epoch: u64, reason: Option<String> },
}

/// Writer half of a signaling socket. Dropping it closes the socket.
#[derive(Clone)]
pub(crate) struct SignalingSender {
    tx: mpsc::UnboundedSender<SignalMessage>,
}

impl SignalingSender {
    /// Queues `message`; returns `false` once the socket is gone.
    pub(crate) fn send(&self, message: SignalMessage) -> bool {
        self.tx.send(message).is_ok()
    }
}

/// Opens the socket and spawns its pump: frames are parsed and forwarded to
/// `events`, queued messages are written out, and a heartbeat keeps the
/// registration alive.
pub(crate) async fn connect(
    url: &Url,
    epoch: u64,
    heartbeat: Duration,
    events: mpsc::UnboundedSender<SocketEvent>,
) -> Result<SignalingSender, TransportError> {
    let (ws_stream, _) = connect_async(url.as_str()).await.map_err(|e| {
        TransportError::new(
            TransportErrorKind::ServerUnavailable,
            format!("could not reach the signaling server: {e}"),
        )
    })?;
    debug!("Signaling socket {} connected", epoch);

    let (mut ws_write, mut ws_read) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<SignalMessage>();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(heartbeat);
        ticker.tick().await;

        let reason = loop {
            tokio::select! {
                frame = ws_read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        trace!("signal <- {}", text);
                        match serde_json::from_str::<SignalMessage>(&text) {
                            Ok(message) => {
                                let _ = events.send(SocketEvent::Frame { epoch, message });
                            }
                            Err(e) => debug!("Ignoring unreadable signaling frame: {}", e),
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break frame.map(|f| f.reason.to_string());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break Some(e.to_string()),
                    None => break None,
                },

                outgoing = rx.recv() => {
                    let Some(message) = outgoing else {
                        debug!("Signaling socket {} released", epoch);
                        let _ = ws_write.send(Message::Close(None)).await;
                        return;
                    };
                    let text = match serde_json::to_string(&message) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Failed to encode signaling frame: {}", e);
                            continue;
                        }
                    };
                    trace!("signal -> {}", text);
                    if let Err(e) = ws_write.send(Message::Text(text)).await {
                        break Some(e.to_string());
                    }
                }

                _ = ticker.tick() => {
                    if let Ok(text) = serde_json::to_string(&SignalMessage::heartbeat()) {
                        if let Err(e) = ws_write.send(Message::Text(text)).await {
                            break Some(e.to_string());
                        }
                    }
                }
            }
        };

        warn!(
            "Signaling socket {} closed: {}",
            epoch,
            reason.as_deref().unwrap_or("connection ended")
        );
        let _ = events.send(SocketEvent::Closed { epoch, reason });
    });

    Ok(SignalingSender { tx })
}
