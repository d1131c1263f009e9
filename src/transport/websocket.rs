use super::sockjs::{self, SessionUrl, SockJsFrame};
use super::{Duplex, Transport};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// SockJS session carried over a single WebSocket
pub struct WebSocketTransport {
    open_timeout: Duration,
}

impl WebSocketTransport {
    pub fn new(open_timeout: Duration) -> Self {
        Self { open_timeout }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn name(&self) -> String {
        "websocket".to_string()
    }

    async fn open(&self, endpoint: &str) -> Result<Duplex> {
        let session = SessionUrl::generate(endpoint)?;
        let url = session.websocket_url();
        info!(url = %url, "Connecting to SockJS websocket");

        let (stream, _response) =
            tokio::time::timeout(self.open_timeout, tokio_tungstenite::connect_async(url.as_str()))
                .await
                .context("WebSocket connect timed out")?
                .context("Failed to connect WebSocket")?;

        let (mut write, mut read) = stream.split();

        // The server must greet with an open frame before anything else
        let first = tokio::time::timeout(self.open_timeout, read.next())
            .await
            .context("Timed out waiting for SockJS open frame")?;
        match first {
            Some(Ok(Message::Text(text))) => match sockjs::parse_frame(text.as_str()) {
                Ok(SockJsFrame::Open) => {}
                Ok(other) => bail!("Expected SockJS open frame, got {:?}", other),
                Err(e) => bail!("Invalid SockJS greeting: {}", e),
            },
            Some(Ok(other)) => bail!("Unexpected WebSocket greeting: {:?}", other),
            Some(Err(e)) => {
                return Err(anyhow::Error::new(e).context("WebSocket error during SockJS open"))
            }
            None => bail!("WebSocket closed before SockJS open frame"),
        }

        let (inbound_tx, inbound_rx) = mpsc::channel::<String>(256);
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(64);
        let session_id = session.session_id().to_string();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    msg = read.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                match sockjs::parse_frame(text.as_str()) {
                                    Ok(SockJsFrame::Messages(messages)) => {
                                        for m in messages {
                                            if inbound_tx.send(m).await.is_err() {
                                                return;
                                            }
                                        }
                                    }
                                    Ok(SockJsFrame::Heartbeat) | Ok(SockJsFrame::Open) => {}
                                    Ok(SockJsFrame::Close { code, reason }) => {
                                        info!(code = code, reason = %reason, "SockJS session closed by server");
                                        break;
                                    }
                                    Err(e) => {
                                        warn!(error = %e, "Ignoring malformed SockJS frame");
                                    }
                                }
                            }
                            Some(Ok(Message::Ping(data))) => {
                                if let Err(e) = write.send(Message::Pong(data)).await {
                                    warn!(error = %e, "Failed to send pong");
                                    break;
                                }
                            }
                            Some(Ok(Message::Close(_))) => {
                                info!("WebSocket closed by server");
                                break;
                            }
                            Some(Ok(_)) => {
                                // Ignore binary, pong messages
                            }
                            Some(Err(e)) => {
                                warn!(error = %e, "WebSocket read error");
                                break;
                            }
                            None => break,
                        }
                    }

                    out = outbound_rx.recv() => {
                        match out {
                            Some(text) => {
                                let payload = sockjs::encode_send(&[text]);
                                if let Err(e) = write.send(Message::Text(payload.into())).await {
                                    warn!(error = %e, "WebSocket write failed");
                                    break;
                                }
                            }
                            None => {
                                let _ = write.send(Message::Close(None)).await;
                                break;
                            }
                        }
                    }
                }
            }

            debug!(session_id = %session_id, "WebSocket transport task finished");
        });

        Ok(Duplex {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
