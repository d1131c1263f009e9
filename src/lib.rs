// Course notification model and severity table
pub mod notification;

// STOMP framing
pub mod stomp;

// SockJS broker transports
pub mod transport;

// User-visible alerts
pub mod alert;

// Notification bridge
pub mod bridge;

// Configuration
pub mod config;

pub use bridge::{ConnectionState, HandlerId, NotificationBridge};
pub use config::BridgeConfig;
pub use notification::{AlertLevel, Notification, NotificationType};
