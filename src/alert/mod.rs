// User-visible alerts raised for incoming notifications

use crate::notification::{AlertLevel, Notification};
use serde::Deserialize;
use std::time::Duration;
use tracing::{error, info, warn};

/// Alert configuration
#[derive(Clone, Debug, Deserialize)]
pub struct AlertConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// How long the alert stays visible
    #[serde(default = "default_duration_ms")]
    pub duration_ms: u64,
    #[serde(default)]
    pub position: AlertPosition,
}

fn default_enabled() -> bool {
    true
}

fn default_duration_ms() -> u64 {
    5000
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            duration_ms: default_duration_ms(),
            position: AlertPosition::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertPosition {
    #[default]
    TopRight,
    TopLeft,
    BottomRight,
    BottomLeft,
}

/// A transient alert shown to the user
#[derive(Clone, Debug, PartialEq)]
pub struct Alert {
    pub title: String,
    pub message: String,
    pub level: AlertLevel,
    pub duration: Duration,
    pub position: AlertPosition,
}

impl Alert {
    /// Build the alert for a notification; severity comes from its type
    pub fn for_notification(notification: &Notification, config: &AlertConfig) -> Self {
        Self {
            title: notification.title.clone(),
            message: notification.content.clone(),
            level: notification.alert_level(),
            duration: Duration::from_millis(config.duration_ms),
            position: config.position,
        }
    }
}

/// Collaborator that renders alerts (toast, desktop notification, log, ...)
pub trait AlertSink: Send + Sync {
    fn show(&self, alert: &Alert);
}

/// Writes alerts to the tracing log at a level matching their severity
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn show(&self, alert: &Alert) {
        match alert.level {
            AlertLevel::Error => {
                error!(title = %alert.title, message = %alert.message, "Alert")
            }
            AlertLevel::Warning => {
                warn!(title = %alert.title, message = %alert.message, "Alert")
            }
            AlertLevel::Success | AlertLevel::Info => {
                info!(title = %alert.title, message = %alert.message, "Alert")
            }
        }
    }
}
