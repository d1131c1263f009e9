use super::sockjs::{self, SessionUrl, SockJsFrame};
use super::{Duplex, Transport};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// SockJS session carried over XHR long-polling.
///
/// Receives are POSTs to `…/xhr` that the server holds open until it has
/// frames; sends are POSTs to `…/xhr_send`.
pub struct XhrPollingTransport {
    client: reqwest::Client,
    open_timeout: Duration,
}

impl XhrPollingTransport {
    pub fn new(open_timeout: Duration, poll_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(poll_timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            open_timeout,
        })
    }
}

#[async_trait]
impl Transport for XhrPollingTransport {
    fn name(&self) -> String {
        "xhr-polling".to_string()
    }

    async fn open(&self, endpoint: &str) -> Result<Duplex> {
        let session = SessionUrl::generate(endpoint)?;
        let xhr_url = session.xhr_url();
        let send_url = session.xhr_send_url();
        info!(url = %xhr_url, "Opening SockJS xhr-polling session");

        let greeting = tokio::time::timeout(self.open_timeout, poll(&self.client, &xhr_url))
            .await
            .context("Timed out waiting for SockJS open frame")??;
        match sockjs::parse_frame(&greeting) {
            Ok(SockJsFrame::Open) => {}
            Ok(other) => bail!("Expected SockJS open frame, got {:?}", other),
            Err(e) => bail!("Invalid SockJS greeting: {}", e),
        }

        let (inbound_tx, inbound_rx) = mpsc::channel::<String>(256);
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(64);

        // Receive loop: runs until the server closes or the session is dropped
        let client = self.client.clone();
        tokio::spawn(async move {
            loop {
                let body = tokio::select! {
                    _ = inbound_tx.closed() => break,
                    result = poll(&client, &xhr_url) => match result {
                        Ok(body) => body,
                        Err(e) => {
                            warn!(error = %e, "xhr poll failed");
                            break;
                        }
                    },
                };

                match sockjs::parse_frame(&body) {
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
                    Err(e) => warn!(error = %e, "Ignoring malformed SockJS frame"),
                }
            }
            debug!("xhr receive loop finished");
        });

        // Send loop: one POST per outbound message, in order
        let client = self.client.clone();
        tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                let result = client
                    .post(&send_url)
                    .header("Content-Type", "text/plain")
                    .body(sockjs::encode_send(&[text]))
                    .send()
                    .await
                    .and_then(|r| r.error_for_status());
                if let Err(e) = result {
                    warn!(error = %e, "xhr_send failed");
                    break;
                }
            }
            debug!("xhr send loop finished");
        });

        Ok(Duplex {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

async fn poll(client: &reqwest::Client, url: &str) -> Result<String> {
    let body = client
        .post(url)
        .send()
        .await
        .context("xhr request failed")?
        .error_for_status()
        .context("xhr request rejected")?
        .text()
        .await
        .context("Failed to read xhr response")?;
    Ok(body)
}
