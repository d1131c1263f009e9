use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

/// Counters for the notification bridge
#[derive(Default)]
pub struct BridgeStats {
    /// Successful STOMP handshakes
    handshakes: AtomicU64,

    /// Retries scheduled after a drop or a failed attempt
    reconnects: AtomicU64,

    /// MESSAGE frames received on either subscription
    received: AtomicU64,

    /// Payloads dropped because they did not decode
    malformed: AtomicU64,

    /// Handler calls that returned an error or panicked
    handler_failures: AtomicU64,

    last_message_at: RwLock<Option<DateTime<Utc>>>,
}

impl BridgeStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_handshake(&self) {
        self.handshakes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
        *self
            .last_message_at
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
    }

    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_handler_failures(&self, count: usize) {
        self.handler_failures
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Get snapshot of all counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            handshakes: self.handshakes.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            last_message_at: *self
                .last_message_at
                .read()
                .unwrap_or_else(PoisonError::into_inner),
        }
    }
}

/// Snapshot of bridge counters at a point in time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub handshakes: u64,
    pub reconnects: u64,
    pub received: u64,
    pub malformed: u64,
    pub handler_failures: u64,
    pub last_message_at: Option<DateTime<Utc>>,
}
