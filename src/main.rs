use anyhow::{Context, Result};
use course_notify::config::{load_config, BridgeConfig};
use course_notify::NotificationBridge;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "course_notify=info".into()),
        )
        .init();

    let config = match std::env::var("COURSE_NOTIFY_CONFIG") {
        Ok(path) => load_config(&path)
            .map_err(|e| anyhow::anyhow!("Failed to load config '{}': {}", path, e))?,
        Err(_) => BridgeConfig::default(),
    }
    .with_env_overrides();

    let user_id = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("COURSE_NOTIFY_USER_ID").ok())
        .context("Usage: course-notify <user-id> (or set COURSE_NOTIFY_USER_ID)")?;

    info!("Course notification bridge starting...");

    let bridge = NotificationBridge::from_config(&config)?;
    bridge.on_message(|n| {
        info!(
            notification_type = %n.notification_type,
            course_id = ?n.course_id,
            title = %n.title,
            "Notification delivered"
        );
        Ok(())
    });

    bridge.connect(user_id);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    info!("Shutting down");
    bridge.disconnect().await;

    Ok(())
}
