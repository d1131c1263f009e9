use crate::alert::{Alert, AlertConfig, AlertSink};
use crate::bridge::registry::{FanoutReport, HandlerRegistry};
use crate::bridge::stats::BridgeStats;
use crate::notification::Notification;
use crate::stomp::Channel;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

/// Shared dispatch path for both subscriptions: decode, alert, fan out
pub(crate) struct Dispatcher {
    pub(crate) registry: Arc<HandlerRegistry>,
    pub(crate) alerts: Arc<dyn AlertSink>,
    pub(crate) alert_config: AlertConfig,
    pub(crate) notify_tx: broadcast::Sender<Notification>,
    pub(crate) stats: Arc<BridgeStats>,
}

impl Dispatcher {
    /// Handle one MESSAGE body.
    ///
    /// Returns `None` when the payload was malformed and dropped.
    pub(crate) fn dispatch(&self, channel: Channel, body: &[u8]) -> Option<FanoutReport> {
        self.stats.record_received();

        let notification = match Notification::from_slice(body) {
            Ok(n) => n,
            Err(e) => {
                self.stats.record_malformed();
                warn!(channel = %channel, error = %e, "Dropping malformed notification");
                return None;
            }
        };

        debug!(
            channel = %channel,
            notification_type = %notification.notification_type,
            title = %notification.title,
            "Notification received"
        );

        if self.alert_config.enabled {
            let alert = Alert::for_notification(&notification, &self.alert_config);
            if panic::catch_unwind(AssertUnwindSafe(|| self.alerts.show(&alert))).is_err() {
                error!(title = %alert.title, "Alert sink panicked");
            }
        }

        let report = self.registry.notify_all(&notification);
        if report.failed > 0 {
            self.stats.record_handler_failures(report.failed);
        }

        // No receivers is fine
        let _ = self.notify_tx.send(notification);

        Some(report)
    }
}
