use std::time::Duration;

use {
    async_trait::async_trait,
    concierge_channels::{
        ChannelOutbound, Error, EventReceiver, Result, Transport, event_channel,
    },
    concierge_config::{ConciergeConfig, SessionConfig, SidecarConfig},
    tokio::sync::{Mutex, RwLock},
    tracing::{info, warn},
};

use crate::{
    process::{SidecarProcess, SidecarSpawn, find_sidecar_dir, start_sidecar},
    sidecar::{SidecarHandle, connect_with_retry},
    types::GatewayMessage,
};

/// How long to wait for the sidecar to confirm a delivery.
const SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// WhatsApp Web session driven through the sidecar.
pub struct WhatsAppTransport {
    session: SessionConfig,
    sidecar: SidecarConfig,
    send_timeout: Duration,
    handle: RwLock<Option<SidecarHandle>>,
    process: Mutex<Option<SidecarProcess>>,
}

impl WhatsAppTransport {
    pub fn new(session: SessionConfig, sidecar: SidecarConfig) -> Self {
        Self {
            session,
            sidecar,
            send_timeout: SEND_TIMEOUT,
            handle: RwLock::new(None),
            process: Mutex::new(None),
        }
    }

    pub fn from_config(config: &ConciergeConfig) -> Self {
        Self::new(config.session.clone(), config.sidecar.clone())
    }

    #[must_use]
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    async fn ensure_process_running(&self) -> Result<()> {
        let mut process = self.process.lock().await;
        if let Some(proc) = process.as_mut() {
            if proc.is_running() {
                return Ok(());
            }
            warn!("sidecar process died, restarting");
        }

        let dir = find_sidecar_dir(self.sidecar.dir.as_deref())
            .map_err(|e| Error::unavailable(format!("{e:#}")))?;
        let spawn = SidecarSpawn::new(dir, &self.sidecar, &self.session);
        let proc = start_sidecar(&spawn)
            .await
            .map_err(|e| Error::unavailable(format!("{e:#}")))?;
        *process = Some(proc);
        Ok(())
    }
}

#[async_trait]
impl ChannelOutbound for WhatsAppTransport {
    async fn send_text(&self, to: &str, text: &str) -> Result<()> {
        let handle = self
            .handle
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::unavailable("WhatsApp session not started"))?;
        handle.send_text(to, text, self.send_timeout).await
    }
}

#[async_trait]
impl Transport for WhatsAppTransport {
    fn id(&self) -> &str {
        "whatsapp-web"
    }

    async fn start(&self) -> Result<EventReceiver> {
        if self.sidecar.spawns_process() {
            self.ensure_process_running().await?;
        }

        let url = self.sidecar.ws_url();
        let (tx, rx) = event_channel();
        let handle = connect_with_retry(&url, self.sidecar.connect_attempts, tx).await?;
        handle.send(&GatewayMessage::Start {
            session: self.session.name.clone(),
            headless: self.session.headless,
        })?;
        info!(session = %self.session.name, "WhatsApp session starting");

        *self.handle.write().await = Some(handle);
        Ok(rx)
    }

    async fn close(&self) -> Result<()> {
        if let Some(handle) = self.handle.write().await.take()
            && let Err(e) = handle.send(&GatewayMessage::Close)
        {
            warn!(error = %e, "could not ask sidecar to close the session");
        }

        let mut process = self.process.lock().await;
        if let Some(mut proc) = process.take() {
            proc.stop()
                .await
                .map_err(|e| Error::unavailable(format!("{e:#}")))?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        concierge_channels::TransportEvent,
        futures::{SinkExt, StreamExt},
        tokio::{net::TcpListener, sync::oneshot},
        tokio_tungstenite::{accept_async, tungstenite::Message},
    };

    /// Fake sidecar that reports every frame type it receives.
    async fn fake_sidecar() -> (String, oneshot::Receiver<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (done_tx, done_rx) = oneshot::channel();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            let mut seen = Vec::new();
            while let Some(Ok(msg)) = ws.next().await {
                let Message::Text(text) = msg else { break };
                let frame: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
                let kind = frame["type"].as_str().unwrap().to_string();
                match kind.as_str() {
                    "start" => {
                        ws.send(Message::Text(r#"{"type":"qr","qr":"QR"}"#.into()))
                            .await
                            .unwrap();
                    },
                    "send_text" => {
                        let reply = serde_json::json!({
                            "type": "send_result",
                            "request_id": frame["request_id"],
                            "success": true,
                        });
                        ws.send(Message::Text(reply.to_string().into()))
                            .await
                            .unwrap();
                    },
                    _ => {},
                }
                seen.push(kind);
                if seen.last().map(String::as_str) == Some("close") {
                    break;
                }
            }
            let _ = done_tx.send(seen);
        });
        (format!("ws://{addr}"), done_rx)
    }

    fn transport(url: String) -> WhatsAppTransport {
        let sidecar = SidecarConfig {
            url: Some(url),
            connect_attempts: 3,
            ..SidecarConfig::default()
        };
        WhatsAppTransport::new(SessionConfig::default(), sidecar)
    }

    #[test]
    fn id_names_the_transport() {
        assert_eq!(transport("ws://127.0.0.1:9".into()).id(), "whatsapp-web");
    }

    #[tokio::test]
    async fn send_before_start_is_unavailable() {
        let transport = transport("ws://127.0.0.1:9".into());
        let err = transport.send_text("a@c.us", "hi").await.unwrap_err();
        assert!(matches!(err, Error::Unavailable { .. }));
    }

    #[tokio::test]
    async fn session_round_trip() {
        let (url, done) = fake_sidecar().await;
        let transport = transport(url);

        let mut events = transport.start().await.unwrap();
        assert!(matches!(
            events.recv().await.unwrap(),
            TransportEvent::PairingCode { ref payload, .. } if payload == "QR"
        ));

        transport.send_text("972501234567@c.us", "hi").await.unwrap();
        transport.close().await.unwrap();

        assert_eq!(done.await.unwrap(), vec!["start", "send_text", "close"]);
        assert!(transport.send_text("972501234567@c.us", "hi").await.is_err());
    }
}
