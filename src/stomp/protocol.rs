use crate::stomp::frame::{Command, Frame};
use std::fmt;
use std::time::Duration;

/// Protocol versions offered in CONNECT
pub const ACCEPT_VERSION: &str = "1.2,1.1,1.0";

/// Client → Broker: open a STOMP session
pub fn connect_frame(host: Option<&str>, heartbeat: HeartBeat) -> Frame {
    let mut frame = Frame::new(Command::Connect)
        .header("accept-version", ACCEPT_VERSION)
        .header("heart-beat", heartbeat.to_string());
    if let Some(host) = host {
        frame = frame.header("host", host);
    }
    frame
}

/// Client → Broker: subscribe with auto acknowledgement
pub fn subscribe_frame(subscription: &Subscription) -> Frame {
    Frame::new(Command::Subscribe)
        .header("id", subscription.id.clone())
        .header("destination", subscription.destination.clone())
        .header("ack", "auto")
}

/// Client → Broker: graceful session close
pub fn disconnect_frame() -> Frame {
    Frame::new(Command::Disconnect)
}

/// Which of the two bridge subscriptions a message arrived on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Per-user queue
    Private,
    /// Topic shared by every session
    Broadcast,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Private => f.write_str("private"),
            Channel::Broadcast => f.write_str("broadcast"),
        }
    }
}

/// An active STOMP subscription
#[derive(Clone, Debug, PartialEq)]
pub struct Subscription {
    pub id: String,
    pub destination: String,
    pub channel: Channel,
}

impl Subscription {
    pub fn new(index: usize, destination: impl Into<String>, channel: Channel) -> Self {
        Self {
            id: format!("sub-{}", index),
            destination: destination.into(),
            channel,
        }
    }
}

/// Expand the `{user_id}` placeholder of a destination template
pub fn user_destination(template: &str, user_id: &str) -> String {
    template.replace("{user_id}", user_id)
}

/// Heart-beat pair in milliseconds: (can send every, want to receive every)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct HeartBeat {
    pub outgoing_ms: u64,
    pub incoming_ms: u64,
}

impl HeartBeat {
    pub fn new(outgoing_ms: u64, incoming_ms: u64) -> Self {
        Self {
            outgoing_ms,
            incoming_ms,
        }
    }

    /// Parse a `heart-beat` header value ("sx,sy"). Missing or bad → 0,0.
    pub fn parse(value: Option<&str>) -> Self {
        let Some(value) = value else {
            return Self::default();
        };
        let mut parts = value.split(',').map(|p| p.trim().parse::<u64>().unwrap_or(0));
        Self {
            outgoing_ms: parts.next().unwrap_or(0),
            incoming_ms: parts.next().unwrap_or(0),
        }
    }

    /// Negotiate with the broker's CONNECTED heart-beat.
    ///
    /// Returns (send every, expect data within); `None` disables that side.
    pub fn negotiate(&self, server: HeartBeat) -> (Option<Duration>, Option<Duration>) {
        let outgoing = if self.outgoing_ms == 0 || server.incoming_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.outgoing_ms.max(server.incoming_ms)))
        };
        let incoming = if self.incoming_ms == 0 || server.outgoing_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.incoming_ms.max(server.outgoing_ms)))
        };
        (outgoing, incoming)
    }
}

impl fmt::Display for HeartBeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.outgoing_ms, self.incoming_ms)
    }
}
