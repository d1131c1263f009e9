use crate::notification::Notification;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::error;

/// Callback invoked for every received notification
pub type Handler = Arc<dyn Fn(&Notification) -> anyhow::Result<()> + Send + Sync>;

/// Identity of one registration; registering the same handler twice yields two ids
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler-{}", self.0)
    }
}

/// Result of fanning one notification out to every handler
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub invoked: usize,
    pub failed: usize,
}

/// Ordered handler registry.
///
/// Handlers run in registration order. Each call is isolated: an error or a
/// panic in one handler is logged and the remaining handlers still run.
pub struct HandlerRegistry {
    next_id: AtomicU64,
    handlers: RwLock<Vec<(HandlerId, Handler)>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            handlers: RwLock::new(Vec::new()),
        }
    }

    pub fn register(&self, handler: Handler) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, handler));
        id
    }

    /// Remove exactly the registration `id`; returns false if it was not registered
    pub fn unregister(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        match handlers.iter().position(|(h, _)| *h == id) {
            Some(index) => {
                handlers.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke every handler with `notification`.
    ///
    /// The list is snapshotted first so handlers may register or unregister
    /// without deadlocking; changes apply from the next notification.
    pub fn notify_all(&self, notification: &Notification) -> FanoutReport {
        let snapshot: Vec<(HandlerId, Handler)> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut report = FanoutReport::default();
        for (id, handler) in snapshot {
            report.invoked += 1;
            match panic::catch_unwind(AssertUnwindSafe(|| handler(notification))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    report.failed += 1;
                    error!(handler = %id, error = %e, "Notification handler failed");
                }
                Err(_) => {
                    report.failed += 1;
                    error!(handler = %id, "Notification handler panicked");
                }
            }
        }
        report
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
