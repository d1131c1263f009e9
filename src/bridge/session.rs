use crate::bridge::dispatch::Dispatcher;
use crate::bridge::stats::BridgeStats;
use crate::stomp::protocol::{connect_frame, disconnect_frame, subscribe_frame, user_destination};
use crate::stomp::{Channel, Command, Frame, FrameDecoder, HeartBeat, Incoming, Subscription};
use crate::transport::{BrokerConfig, Duplex, Transport};
use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Interval};
use tracing::{debug, error, info, warn};

/// STOMP session configuration
#[derive(Clone, Debug, Deserialize)]
pub struct StompConfig {
    /// How often we offer to send heart-beats (0 = never)
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_outgoing_ms: u64,
    /// How often we want heart-beats from the broker (0 = never)
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_incoming_ms: u64,
    /// Per-user queue; `{user_id}` is replaced on connect
    #[serde(default = "default_private_destination")]
    pub private_destination: String,
    #[serde(default = "default_broadcast_destination")]
    pub broadcast_destination: String,
    /// Virtual host sent in CONNECT
    #[serde(default)]
    pub host: Option<String>,
}

fn default_heartbeat_ms() -> u64 {
    4000
}

fn default_private_destination() -> String {
    "/user/{user_id}/queue/notification".to_string()
}

fn default_broadcast_destination() -> String {
    "/topic/notification".to_string()
}

impl Default for StompConfig {
    fn default() -> Self {
        Self {
            heartbeat_outgoing_ms: default_heartbeat_ms(),
            heartbeat_incoming_ms: default_heartbeat_ms(),
            private_destination: default_private_destination(),
            broadcast_destination: default_broadcast_destination(),
            host: None,
        }
    }
}

impl StompConfig {
    pub fn heartbeat(&self) -> HeartBeat {
        HeartBeat::new(self.heartbeat_outgoing_ms, self.heartbeat_incoming_ms)
    }
}

/// Bridge connectivity
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => f.write_str("disconnected"),
            ConnectionState::Connecting => f.write_str("connecting"),
            ConnectionState::Connected => f.write_str("connected"),
        }
    }
}

enum SessionEnd {
    /// disconnect() was called
    Shutdown,
    /// Transport closed or went silent
    Dropped,
}

/// Everything one session task needs
pub(crate) struct SessionContext {
    pub(crate) user_id: String,
    pub(crate) broker: BrokerConfig,
    pub(crate) stomp: StompConfig,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) state_tx: Arc<watch::Sender<ConnectionState>>,
    pub(crate) stats: Arc<BridgeStats>,
}

/// Session task: connect, serve, and retry on a fixed delay until shut down
pub(crate) async fn run(ctx: SessionContext, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        ctx.state_tx.send_replace(ConnectionState::Connecting);

        match ctx.run_once(&mut shutdown).await {
            Ok(SessionEnd::Shutdown) => break,
            Ok(SessionEnd::Dropped) => {
                warn!(user_id = %ctx.user_id, "Broker connection lost");
            }
            Err(e) => {
                warn!(user_id = %ctx.user_id, error = %e, "Broker connection attempt failed");
            }
        }

        ctx.state_tx.send_replace(ConnectionState::Disconnected);

        let delay = ctx.broker.reconnect_delay();
        if delay.is_zero() {
            info!("Reconnection disabled, notification bridge stays disconnected");
            break;
        }

        ctx.stats.record_reconnect();
        info!(delay_ms = delay.as_millis() as u64, "Scheduling broker reconnection");

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }
    }

    ctx.state_tx.send_replace(ConnectionState::Disconnected);
    debug!(user_id = %ctx.user_id, "Notification session task finished");
}

impl SessionContext {
    fn subscriptions(&self) -> Vec<Subscription> {
        vec![
            Subscription::new(
                0,
                user_destination(&self.stomp.private_destination, &self.user_id),
                Channel::Private,
            ),
            Subscription::new(1, self.stomp.broadcast_destination.clone(), Channel::Broadcast),
        ]
    }

    async fn run_once(&self, shutdown: &mut watch::Receiver<bool>) -> Result<SessionEnd> {
        let connect_timeout = self.broker.connect_timeout();

        let Duplex {
            outbound,
            mut inbound,
        } = tokio::select! {
            result = tokio::time::timeout(connect_timeout, self.transport.open(&self.broker.url)) => {
                result.context("Timed out opening broker transport")??
            }
            _ = shutdown.changed() => return Ok(SessionEnd::Shutdown),
        };

        let mut decoder = FrameDecoder::new();
        let heartbeat = self.stomp.heartbeat();
        send(&outbound, connect_frame(self.stomp.host.as_deref(), heartbeat)).await?;

        let reply = tokio::select! {
            result = tokio::time::timeout(connect_timeout, next_frame(&mut inbound, &mut decoder)) => {
                result.context("Timed out waiting for CONNECTED")?
            }
            _ = shutdown.changed() => return Ok(SessionEnd::Shutdown),
        };
        let connected = reply.ok_or_else(|| anyhow!("Broker closed during STOMP handshake"))?;

        match connected.command {
            Command::Connected => {}
            Command::Error => bail!(
                "Broker rejected CONNECT: {}",
                connected.get("message").unwrap_or("no message")
            ),
            other => bail!("Expected CONNECTED, got {}", other),
        }

        let (send_every, expect_within) =
            heartbeat.negotiate(HeartBeat::parse(connected.get("heart-beat")));

        let subscriptions = self.subscriptions();
        for subscription in &subscriptions {
            send(&outbound, subscribe_frame(subscription)).await?;
            debug!(
                id = %subscription.id,
                destination = %subscription.destination,
                "Subscribed"
            );
        }

        if *shutdown.borrow() {
            let _ = send(&outbound, disconnect_frame()).await;
            return Ok(SessionEnd::Shutdown);
        }

        self.stats.record_handshake();
        self.state_tx.send_replace(ConnectionState::Connected);
        info!(
            user_id = %self.user_id,
            version = connected.get("version").unwrap_or("1.0"),
            "Notification bridge connected"
        );

        let mut send_tick =
            send_every.map(|every| tokio::time::interval_at(Instant::now() + every, every));
        let ttl = expect_within.map(|within| within * 2);
        let mut last_seen = Instant::now();

        loop {
            while let Some(item) = decoder.next_item() {
                match item {
                    Ok(Incoming::Frame(frame)) => self.handle_frame(frame, &subscriptions),
                    Ok(Incoming::Heartbeat) => {}
                    Err(e) => warn!(error = %e, "Skipping undecodable STOMP frame"),
                }
            }

            let deadline = ttl.map(|ttl| last_seen + ttl);

            tokio::select! {
                msg = inbound.recv() => match msg {
                    Some(text) => {
                        last_seen = Instant::now();
                        decoder.push(text.as_bytes());
                    }
                    None => {
                        info!("Broker transport closed");
                        return Ok(SessionEnd::Dropped);
                    }
                },

                _ = tick(&mut send_tick) => {
                    if outbound.send("\n".to_string()).await.is_err() {
                        return Ok(SessionEnd::Dropped);
                    }
                }

                _ = expire(deadline) => {
                    warn!(
                        ttl_ms = ttl.map(|t| t.as_millis() as u64).unwrap_or(0),
                        "No data from broker within heart-beat window"
                    );
                    return Ok(SessionEnd::Dropped);
                }

                _ = shutdown.changed() => {
                    let _ = send(&outbound, disconnect_frame()).await;
                    return Ok(SessionEnd::Shutdown);
                }
            }
        }
    }

    fn handle_frame(&self, frame: Frame, subscriptions: &[Subscription]) {
        match frame.command {
            Command::Message => {
                let channel = frame
                    .get("subscription")
                    .and_then(|id| subscriptions.iter().find(|s| s.id == id))
                    .or_else(|| {
                        frame
                            .get("destination")
                            .and_then(|d| subscriptions.iter().find(|s| s.destination == d))
                    })
                    .map(|s| s.channel);

                match channel {
                    Some(channel) => {
                        self.dispatcher.dispatch(channel, &frame.body);
                    }
                    None => warn!(
                        subscription = frame.get("subscription").unwrap_or(""),
                        destination = frame.get("destination").unwrap_or(""),
                        "MESSAGE for unknown subscription, dropping"
                    ),
                }
            }
            Command::Error => {
                error!(
                    message = frame.get("message").unwrap_or(""),
                    body = %String::from_utf8_lossy(&frame.body),
                    "STOMP error frame"
                );
            }
            Command::Receipt => {
                debug!(receipt_id = frame.get("receipt-id").unwrap_or(""), "Receipt");
            }
            other => {
                debug!(command = %other, "Ignoring unexpected frame");
            }
        }
    }
}

async fn send(outbound: &mpsc::Sender<String>, frame: Frame) -> Result<()> {
    outbound
        .send(frame.encode())
        .await
        .map_err(|_| anyhow!("Broker transport closed"))
}

/// Next complete frame, skipping heart-beats; `None` once the transport closes
async fn next_frame(
    inbound: &mut mpsc::Receiver<String>,
    decoder: &mut FrameDecoder,
) -> Option<Frame> {
    loop {
        while let Some(item) = decoder.next_item() {
            match item {
                Ok(Incoming::Frame(frame)) => return Some(frame),
                Ok(Incoming::Heartbeat) => {}
                Err(e) => warn!(error = %e, "Skipping undecodable STOMP frame"),
            }
        }
        let text = inbound.recv().await?;
        decoder.push(text.as_bytes());
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
