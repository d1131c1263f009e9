pub mod env;

use serde::Deserialize;

// Re-export component config types
pub use crate::alert::{AlertConfig, AlertPosition};
pub use crate::bridge::StompConfig;
pub use crate::transport::{BrokerConfig, TransportKind};

/// Complete bridge configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub stomp: StompConfig,
    #[serde(default)]
    pub alert: AlertConfig,
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<BridgeConfig, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    let config: BridgeConfig = toml::from_str(&contents)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.broker.url, "http://localhost:8084/ws/notification");
        assert_eq!(config.broker.reconnect_delay_ms, 5000);
        assert_eq!(
            config.broker.transports,
            vec![TransportKind::WebSocket, TransportKind::XhrPolling]
        );
        assert_eq!(config.stomp.heartbeat_incoming_ms, 4000);
        assert_eq!(config.stomp.heartbeat_outgoing_ms, 4000);
        assert_eq!(
            config.stomp.private_destination,
            "/user/{user_id}/queue/notification"
        );
        assert_eq!(config.stomp.broadcast_destination, "/topic/notification");
        assert_eq!(config.alert.duration_ms, 5000);
        assert_eq!(config.alert.position, AlertPosition::TopRight);
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [broker]
            url = "https://school.example/ws/notification"
            transports = ["xhr_polling"]
            reconnect_delay_ms = 1000
            connect_timeout_ms = 3000

            [stomp]
            heartbeat_outgoing_ms = 0
            heartbeat_incoming_ms = 10000
            broadcast_destination = "/topic/campus"
            host = "school"

            [alert]
            enabled = false
            position = "bottom-right"
        "#;

        let config: BridgeConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.broker.url, "https://school.example/ws/notification");
        assert_eq!(config.broker.transports, vec![TransportKind::XhrPolling]);
        assert_eq!(config.broker.reconnect_delay_ms, 1000);
        assert_eq!(config.broker.connect_timeout_ms, 3000);
        assert_eq!(config.stomp.heartbeat_outgoing_ms, 0);
        assert_eq!(config.stomp.broadcast_destination, "/topic/campus");
        assert_eq!(config.stomp.host.as_deref(), Some("school"));
        assert_eq!(config.alert.enabled, false);
        assert_eq!(config.alert.position, AlertPosition::BottomRight);
    }

    #[test]
    fn test_partial_config() {
        // Test that missing sections use defaults
        let toml = r#"
            [broker]
            reconnect_delay_ms = 0
        "#;

        let config: BridgeConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.broker.reconnect_delay_ms, 0);
        assert_eq!(config.broker.connect_timeout_ms, 10_000); // Default
        assert_eq!(config.stomp.heartbeat_incoming_ms, 4000); // Default
        assert!(config.alert.enabled); // Default
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[stomp]\nheartbeat_incoming_ms = 2500").unwrap();

        let config = load_config(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.stomp.heartbeat_incoming_ms, 2500);
    }

    #[test]
    fn test_load_config_missing_file() {
        assert!(load_config("/nonexistent/course-notify.toml").is_err());
    }
}
