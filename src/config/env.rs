use super::BridgeConfig;

impl BridgeConfig {
    /// Apply COURSE_NOTIFY_* env vars on top of this config.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup; unparsable values are ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = lookup("COURSE_NOTIFY_BROKER_URL") {
            if !v.is_empty() {
                self.broker.url = v;
            }
        }
        if let Some(v) = lookup("COURSE_NOTIFY_RECONNECT_DELAY_MS") {
            if let Ok(n) = v.parse::<u64>() {
                self.broker.reconnect_delay_ms = n;
            }
        }
        if let Some(v) = lookup("COURSE_NOTIFY_HEARTBEAT_INCOMING_MS") {
            if let Ok(n) = v.parse::<u64>() {
                self.stomp.heartbeat_incoming_ms = n;
            }
        }
        if let Some(v) = lookup("COURSE_NOTIFY_HEARTBEAT_OUTGOING_MS") {
            if let Ok(n) = v.parse::<u64>() {
                self.stomp.heartbeat_outgoing_ms = n;
            }
        }
        if let Some(v) = lookup("COURSE_NOTIFY_ALERTS_ENABLED") {
            if let Ok(b) = v.parse::<bool>() {
                self.alert.enabled = b;
            }
        }

        self
    }
}
