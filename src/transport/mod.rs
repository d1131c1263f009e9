// Broker transports: SockJS over WebSocket with an XHR-polling fallback

mod polling;
pub mod sockjs;
mod websocket;

pub use polling::XhrPollingTransport;
pub use websocket::WebSocketTransport;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Broker connection configuration
#[derive(Clone, Debug, Deserialize)]
pub struct BrokerConfig {
    /// SockJS endpoint (http or https)
    #[serde(default = "default_url")]
    pub url: String,
    /// Transports to try, in order
    #[serde(default = "default_transports")]
    pub transports: Vec<TransportKind>,
    /// Fixed delay before reconnecting after a drop (0 disables reconnection)
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Time allowed for the transport open plus the STOMP handshake
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Upper bound for a single long-poll request
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
}

fn default_url() -> String {
    "http://localhost:8084/ws/notification".to_string()
}

fn default_transports() -> Vec<TransportKind> {
    vec![TransportKind::WebSocket, TransportKind::XhrPolling]
}

fn default_reconnect_delay_ms() -> u64 {
    5000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_poll_timeout_ms() -> u64 {
    35_000
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            transports: default_transports(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            poll_timeout_ms: default_poll_timeout_ms(),
        }
    }
}

impl BrokerConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    WebSocket,
    XhrPolling,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::WebSocket => f.write_str("websocket"),
            TransportKind::XhrPolling => f.write_str("xhr-polling"),
        }
    }
}

/// An open text channel to the broker.
///
/// `outbound` carries STOMP text towards the broker. `inbound` yields STOMP
/// text from the broker and ends when the connection drops. Dropping both
/// halves closes the underlying connection.
pub struct Duplex {
    pub outbound: mpsc::Sender<String>,
    pub inbound: mpsc::Receiver<String>,
}

impl Duplex {
    /// A connected pair: (client side, broker side)
    pub fn pair(buffer: usize) -> (Duplex, Duplex) {
        let (to_broker_tx, to_broker_rx) = mpsc::channel(buffer);
        let (to_client_tx, to_client_rx) = mpsc::channel(buffer);
        (
            Duplex {
                outbound: to_broker_tx,
                inbound: to_client_rx,
            },
            Duplex {
                outbound: to_client_tx,
                inbound: to_broker_rx,
            },
        )
    }
}

/// Opens connections to the broker endpoint
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> String;

    async fn open(&self, endpoint: &str) -> Result<Duplex>;
}

/// Tries each transport in order until one opens
pub struct FallbackTransport {
    transports: Vec<Arc<dyn Transport>>,
}

impl FallbackTransport {
    pub fn new(transports: Vec<Arc<dyn Transport>>) -> Self {
        Self { transports }
    }
}

#[async_trait]
impl Transport for FallbackTransport {
    fn name(&self) -> String {
        let names: Vec<String> = self.transports.iter().map(|t| t.name()).collect();
        names.join(",")
    }

    async fn open(&self, endpoint: &str) -> Result<Duplex> {
        let mut last_err = None;

        for transport in &self.transports {
            match transport.open(endpoint).await {
                Ok(duplex) => {
                    info!(transport = %transport.name(), "Broker transport opened");
                    return Ok(duplex);
                }
                Err(e) => {
                    warn!(
                        transport = %transport.name(),
                        error = %e,
                        "Broker transport unavailable, trying next"
                    );
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("No broker transports configured")))
    }
}

/// Build the configured transport chain
pub fn from_config(config: &BrokerConfig) -> Result<Arc<dyn Transport>> {
    let mut transports: Vec<Arc<dyn Transport>> = Vec::new();
    for kind in &config.transports {
        let transport: Arc<dyn Transport> = match kind {
            TransportKind::WebSocket => {
                Arc::new(WebSocketTransport::new(config.connect_timeout()))
            }
            TransportKind::XhrPolling => Arc::new(XhrPollingTransport::new(
                config.connect_timeout(),
                Duration::from_millis(config.poll_timeout_ms),
            )?),
        };
        transports.push(transport);
    }
    Ok(Arc::new(FallbackTransport::new(transports)))
}
