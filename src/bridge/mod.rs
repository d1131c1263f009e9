// Notification bridge: broker session lifecycle, dispatch and handler fan-out

mod dispatch;
mod manager;
mod registry;
mod session;
mod stats;

pub use manager::NotificationBridge;
pub use registry::{FanoutReport, Handler, HandlerId, HandlerRegistry};
pub use session::{ConnectionState, StompConfig};
pub use stats::StatsSnapshot;
