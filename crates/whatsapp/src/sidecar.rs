//! WebSocket connection to the sidecar.
//!
//! One reader task turns sidecar frames into [`TransportEvent`]s on the
//! transport's event stream and completes pending sends; one writer task
//! serialises outgoing frames.

use std::{collections::HashMap, sync::Arc, time::Duration};

use {
    concierge_channels::{Error, EventSender, Result, TransportEvent},
    futures::{SinkExt, StreamExt},
    tokio::sync::{Mutex, mpsc, oneshot},
    tokio_tungstenite::{connect_async, tungstenite::Message},
    tracing::{debug, info, warn},
};

use crate::types::{GatewayMessage, SidecarMessage};

/// Pause between connection attempts.
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(500);

type Pending = Arc<Mutex<HashMap<String, oneshot::Sender<std::result::Result<(), String>>>>>;

/// Live connection to the sidecar.
#[derive(Clone)]
pub struct SidecarHandle {
    write_tx: mpsc::UnboundedSender<String>,
    pending: Pending,
}

impl SidecarHandle {
    pub fn is_connected(&self) -> bool {
        !self.write_tx.is_closed()
    }

    pub fn send(&self, msg: &GatewayMessage) -> Result<()> {
        let json = serde_json::to_string(msg)?;
        self.write_tx
            .send(json)
            .map_err(|_| Error::unavailable("sidecar connection closed"))
    }

    /// Send a text message and wait for the sidecar's delivery report.
    pub async fn send_text(&self, to: &str, text: &str, timeout: Duration) -> Result<()> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(request_id.clone(), tx);

        let frame = GatewayMessage::SendText {
            request_id: request_id.clone(),
            to: to.to_string(),
            text: text.to_string(),
        };
        if let Err(e) = self.send(&frame) {
            self.pending.lock().await.remove(&request_id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(reason))) => Err(Error::send_failed(to, reason)),
            Ok(Err(_)) => Err(Error::unavailable("sidecar connection closed")),
            Err(_) => {
                self.pending.lock().await.remove(&request_id);
                Err(Error::Timeout {
                    seconds: timeout.as_secs(),
                })
            },
        }
    }
}

/// Connect to the sidecar, retrying while the process starts up.
pub async fn connect_with_retry(
    url: &str,
    attempts: u32,
    events: EventSender,
) -> Result<SidecarHandle> {
    let attempts = attempts.max(1);
    let mut last_err = None;
    for attempt in 1..=attempts {
        match connect(url, events.clone()).await {
            Ok(handle) => return Ok(handle),
            Err(e) => {
                debug!(url, attempt, error = %e, "sidecar not reachable yet");
                last_err = Some(e);
            },
        }
        if attempt < attempts {
            tokio::time::sleep(CONNECT_RETRY_DELAY).await;
        }
    }
    Err(last_err.unwrap_or_else(|| Error::unavailable("sidecar not reachable")))
}

async fn connect(url: &str, events: EventSender) -> Result<SidecarHandle> {
    let (ws, _response) = connect_async(url)
        .await
        .map_err(|e| Error::external(format!("connecting to {url}"), e))?;
    info!(url, "connected to WhatsApp sidecar");

    let (mut sink, mut stream) = ws.split();
    let (write_tx, mut write_rx) = mpsc::unbounded_channel::<String>();
    let pending: Pending = Arc::new(Mutex::new(HashMap::new()));

    tokio::spawn(async move {
        while let Some(json) = write_rx.recv().await {
            if let Err(e) = sink.send(Message::Text(json.into())).await {
                warn!(error = %e, "failed to write to sidecar");
                break;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    });

    let reader_pending = Arc::clone(&pending);
    tokio::spawn(async move {
        let reason = loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    handle_frame(text.as_str(), &events, &reader_pending).await;
                },
                Some(Ok(Message::Close(_))) | None => break "sidecar connection closed".to_string(),
                Some(Ok(_)) => {},
                Some(Err(e)) => break format!("sidecar connection error: {e}"),
            }
        };
        warn!(%reason, "sidecar connection lost");
        // Waiters see their sender dropped.
        reader_pending.lock().await.clear();
        let _ = events
            .send(TransportEvent::Closed {
                reason: Some(reason),
            })
            .await;
    });

    Ok(SidecarHandle { write_tx, pending })
}

async fn handle_frame(text: &str, events: &EventSender, pending: &Pending) {
    let msg: SidecarMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(error = %e, "unreadable sidecar frame");
            return;
        },
    };

    match msg {
        SidecarMessage::SendResult {
            request_id,
            success,
            error,
        } => {
            let result = if success {
                Ok(())
            } else {
                Err(error.unwrap_or_else(|| "unknown error".into()))
            };
            match pending.lock().await.remove(&request_id) {
                Some(waiter) => {
                    let _ = waiter.send(result);
                },
                None => debug!(request_id, "send result for unknown request"),
            }
        },
        SidecarMessage::Error { error } => warn!(error, "sidecar error"),
        other => {
            if let Some(event) = other.into_event()
                && events.send(event).await.is_err()
            {
                debug!("transport event stream dropped");
            }
        },
    }
}
