use crate::alert::{AlertSink, TracingAlertSink};
use crate::bridge::dispatch::Dispatcher;
use crate::bridge::registry::{HandlerId, HandlerRegistry};
use crate::bridge::session::{self, ConnectionState, SessionContext, StompConfig};
use crate::bridge::stats::{BridgeStats, StatsSnapshot};
use crate::config::BridgeConfig;
use crate::notification::Notification;
use crate::transport::{self, BrokerConfig, Transport};
use anyhow::Result;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long disconnect() waits for the session task to wind down
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

struct SessionHandle {
    user_id: String,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Real-time notification bridge.
///
/// Owns at most one broker session at a time. Create one per process at
/// startup and share it as `Arc<NotificationBridge>`.
pub struct NotificationBridge {
    broker: BrokerConfig,
    stomp: StompConfig,
    transport: Arc<dyn Transport>,
    registry: Arc<HandlerRegistry>,
    dispatcher: Arc<Dispatcher>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    stats: Arc<BridgeStats>,
    session: Mutex<Option<SessionHandle>>,
}

impl NotificationBridge {
    /// Create a bridge over an explicit transport and alert sink
    pub fn new(
        config: &BridgeConfig,
        transport: Arc<dyn Transport>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (notify_tx, _) = broadcast::channel(256);
        let registry = Arc::new(HandlerRegistry::new());
        let stats = Arc::new(BridgeStats::new());

        let dispatcher = Arc::new(Dispatcher {
            registry: Arc::clone(&registry),
            alerts,
            alert_config: config.alert.clone(),
            notify_tx,
            stats: Arc::clone(&stats),
        });

        Self {
            broker: config.broker.clone(),
            stomp: config.stomp.clone(),
            transport,
            registry,
            dispatcher,
            state_tx: Arc::new(state_tx),
            stats,
            session: Mutex::new(None),
        }
    }

    /// Create a bridge with the configured transport chain, alerts go to the log
    pub fn from_config(config: &BridgeConfig) -> Result<Self> {
        let transport = transport::from_config(&config.broker)?;
        Ok(Self::new(config, transport, Arc::new(TracingAlertSink)))
    }

    /// Start a session for `user_id`.
    ///
    /// Returns immediately; the handshake runs on a spawned task. A no-op
    /// while a session is live. Must be called within a Tokio runtime.
    pub fn connect(&self, user_id: impl Into<String>) {
        let user_id = user_id.into();
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = session.as_ref() {
            if !existing.task.is_finished() {
                debug!(
                    user_id = %existing.user_id,
                    requested = %user_id,
                    "Notification bridge already connected"
                );
                return;
            }
        }

        info!(user_id = %user_id, endpoint = %self.broker.url, "Connecting notification bridge");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.state_tx.send_replace(ConnectionState::Connecting);

        let ctx = SessionContext {
            user_id: user_id.clone(),
            broker: self.broker.clone(),
            stomp: self.stomp.clone(),
            transport: Arc::clone(&self.transport),
            dispatcher: Arc::clone(&self.dispatcher),
            state_tx: Arc::clone(&self.state_tx),
            stats: Arc::clone(&self.stats),
        };
        let task = tokio::spawn(session::run(ctx, shutdown_rx));

        *session = Some(SessionHandle {
            user_id,
            shutdown_tx,
            task,
        });
    }

    /// Tear down the session and cancel any pending reconnection.
    ///
    /// Safe to call when already disconnected.
    pub async fn disconnect(&self) {
        let handle = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(handle) = handle {
            let _ = handle.shutdown_tx.send(true);
            self.state_tx.send_replace(ConnectionState::Disconnected);

            let mut task = handle.task;
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                warn!("Session task did not stop in time, aborting");
                task.abort();
            }
            info!(user_id = %handle.user_id, "Notification bridge disconnected");
        }

        self.state_tx.send_replace(ConnectionState::Disconnected);
    }

    pub fn is_connected(&self) -> bool {
        *self.state_tx.borrow() == ConnectionState::Connected
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Receiver for awaiting state transitions
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Register a handler; it runs for every notification in registration order
    pub fn on_message<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&Notification) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.registry.register(Arc::new(handler))
    }

    /// Remove the registration `id`
    pub fn off_message(&self, id: HandlerId) -> bool {
        self.registry.unregister(id)
    }

    /// Stream of decoded notifications for async consumers
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.dispatcher.notify_tx.subscribe()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// User of the live session, if any
    pub fn user_id(&self) -> Option<String> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|s| !s.task.is_finished())
            .map(|s| s.user_id.clone())
    }
}

impl Drop for NotificationBridge {
    fn drop(&mut self) {
        let session = self
            .session
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(session) = session {
            let _ = session.shutdown_tx.send(true);
        }
    }
}
