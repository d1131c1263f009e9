// Integration tests for the notification bridge lifecycle and fan-out.
//
// The broker side is played by the test through an in-memory Transport: every
// open() hands the test the broker end of a Duplex, and the test speaks STOMP
// on it directly.

use anyhow::{bail, Result};
use async_trait::async_trait;
use course_notify::alert::{Alert, AlertSink};
use course_notify::stomp::{Command, Frame, FrameDecoder, Incoming};
use course_notify::transport::{Duplex, Transport};
use course_notify::{AlertLevel, BridgeConfig, ConnectionState, Notification, NotificationBridge};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

const WAIT: Duration = Duration::from_secs(5);

// ── in-memory broker ─────────────────────────────────────────────────────────

struct MockTransport {
    opens: AtomicUsize,
    refuse: AtomicBool,
    conns_tx: mpsc::UnboundedSender<Duplex>,
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> String {
        "mock".to_string()
    }

    async fn open(&self, _endpoint: &str) -> Result<Duplex> {
        if self.refuse.load(Ordering::SeqCst) {
            bail!("connection refused");
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        let (client, broker) = Duplex::pair(64);
        self.conns_tx.send(broker)?;
        Ok(client)
    }
}

/// Broker end of one connection
struct BrokerConn {
    duplex: Duplex,
    decoder: FrameDecoder,
}

impl BrokerConn {
    async fn recv_raw(&mut self) -> Option<String> {
        tokio::time::timeout(WAIT, self.duplex.inbound.recv())
            .await
            .expect("timed out waiting for client data")
    }

    /// Next frame from the client, skipping heart-beats
    async fn recv_frame(&mut self) -> Frame {
        loop {
            while let Some(item) = self.decoder.next_item() {
                if let Ok(Incoming::Frame(frame)) = item {
                    return frame;
                }
            }
            let text = self.recv_raw().await.expect("client closed the connection");
            self.decoder.push(text.as_bytes());
        }
    }

    async fn send(&self, frame: Frame) {
        self.duplex
            .outbound
            .send(frame.encode())
            .await
            .expect("client went away");
    }

    /// Accept CONNECT and return the two SUBSCRIBE frames
    async fn handshake(&mut self, heart_beat: &str) -> Vec<Frame> {
        let connect = self.recv_frame().await;
        assert_eq!(connect.command, Command::Connect);

        self.send(
            Frame::new(Command::Connected)
                .header("version", "1.2")
                .header("heart-beat", heart_beat),
        )
        .await;

        let first = self.recv_frame().await;
        let second = self.recv_frame().await;
        assert_eq!(first.command, Command::Subscribe);
        assert_eq!(second.command, Command::Subscribe);
        vec![first, second]
    }

    async fn push(&self, subscription: &str, destination: &str, body: String) {
        self.send(
            Frame::new(Command::Message)
                .header("subscription", subscription)
                .header("destination", destination)
                .header("message-id", "m-1")
                .header("content-type", "application/json")
                .body(body),
        )
        .await;
    }

    async fn push_private(&self, user_id: &str, body: String) {
        let destination = format!("/user/{}/queue/notification", user_id);
        self.push("sub-0", &destination, body).await;
    }
}

#[derive(Default)]
struct RecordingSink {
    alerts: Mutex<Vec<Alert>>,
    panic_on_show: AtomicBool,
}

impl AlertSink for RecordingSink {
    fn show(&self, alert: &Alert) {
        if self.panic_on_show.load(Ordering::SeqCst) {
            panic!("alert sink failure");
        }
        self.alerts.lock().unwrap().push(alert.clone());
    }
}

struct Harness {
    bridge: NotificationBridge,
    transport: Arc<MockTransport>,
    conns_rx: mpsc::UnboundedReceiver<Duplex>,
    alerts: Arc<RecordingSink>,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(test_config())
    }

    fn with_config(config: BridgeConfig) -> Self {
        let (conns_tx, conns_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(MockTransport {
            opens: AtomicUsize::new(0),
            refuse: AtomicBool::new(false),
            conns_tx,
        });
        let alerts = Arc::new(RecordingSink::default());
        let bridge = NotificationBridge::new(&config, transport.clone(), alerts.clone());
        Self {
            bridge,
            transport,
            conns_rx,
            alerts,
        }
    }

    async fn accept(&mut self) -> BrokerConn {
        let duplex = tokio::time::timeout(WAIT, self.conns_rx.recv())
            .await
            .expect("timed out waiting for connection")
            .expect("transport dropped");
        BrokerConn {
            duplex,
            decoder: FrameDecoder::new(),
        }
    }

    /// connect(user_id), complete the handshake, wait for Connected
    async fn connect(&mut self, user_id: &str) -> BrokerConn {
        self.bridge.connect(user_id);
        let mut conn = self.accept().await;
        conn.handshake("0,0").await;
        self.wait_for(ConnectionState::Connected).await;
        conn
    }

    async fn wait_for(&self, state: ConnectionState) {
        let mut rx = self.bridge.watch_state();
        let reached = tokio::time::timeout(WAIT, rx.wait_for(|s| *s == state))
            .await
            .expect("timed out waiting for state")
            .is_ok();
        assert!(reached, "state channel closed");
    }
}

fn test_config() -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.broker.url = "http://mock/ws/notification".to_string();
    config.broker.reconnect_delay_ms = 50;
    config.broker.connect_timeout_ms = 2000;
    config.stomp.heartbeat_incoming_ms = 0;
    config.stomp.heartbeat_outgoing_ms = 0;
    config
}

fn payload(kind: &str, title: &str) -> String {
    json!({
        "notificationId": 1,
        "title": title,
        "content": "body",
        "notificationType": kind,
        "priority": 0,
        "courseId": 3
    })
    .to_string()
}

async fn next_notification(rx: &mut broadcast::Receiver<Notification>) -> Notification {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for notification")
        .expect("notification channel closed")
}

fn recorder(log: &Arc<Mutex<Vec<String>>>, name: &str) -> impl Fn(&Notification) -> Result<()> {
    let log = Arc::clone(log);
    let name = name.to_string();
    move |n: &Notification| {
        log.lock().unwrap().push(format!("{}:{}", name, n.title));
        Ok(())
    }
}

// ── lifecycle ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_connect_twice_performs_one_handshake() {
    let mut h = Harness::new();
    let _conn = h.connect("u1").await;

    h.bridge.connect("u1");
    h.bridge.connect("someone-else");
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(h.transport.opens.load(Ordering::SeqCst), 1);
    assert_eq!(h.bridge.stats().handshakes, 1);
    assert!(h.conns_rx.try_recv().is_err());
    assert_eq!(h.bridge.user_id().as_deref(), Some("u1"));
}

#[tokio::test]
async fn test_connect_subscribes_private_and_broadcast() {
    let mut h = Harness::new();
    h.bridge.connect("1001");
    let mut conn = h.accept().await;

    let connect = conn.recv_frame().await;
    assert_eq!(connect.get("accept-version"), Some("1.2,1.1,1.0"));
    assert_eq!(connect.get("heart-beat"), Some("0,0"));

    conn.send(Frame::new(Command::Connected).header("version", "1.2"))
        .await;
    let private = conn.recv_frame().await;
    let broadcast = conn.recv_frame().await;

    assert_eq!(private.get("id"), Some("sub-0"));
    assert_eq!(
        private.get("destination"),
        Some("/user/1001/queue/notification")
    );
    assert_eq!(broadcast.get("id"), Some("sub-1"));
    assert_eq!(broadcast.get("destination"), Some("/topic/notification"));
}

#[tokio::test]
async fn test_is_connected_tracks_lifecycle() {
    let mut h = Harness::new();
    assert!(!h.bridge.is_connected());
    assert_eq!(h.bridge.state(), ConnectionState::Disconnected);

    let mut conn = h.connect("u1").await;
    assert!(h.bridge.is_connected());

    h.bridge.disconnect().await;
    assert!(!h.bridge.is_connected());
    assert_eq!(h.bridge.state(), ConnectionState::Disconnected);

    // Broker sees a graceful DISCONNECT
    let frame = conn.recv_frame().await;
    assert_eq!(frame.command, Command::Disconnect);
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let mut h = Harness::new();
    h.bridge.disconnect().await;
    assert!(!h.bridge.is_connected());

    let _conn = h.connect("u1").await;
    h.bridge.disconnect().await;
    h.bridge.disconnect().await;
    assert!(!h.bridge.is_connected());
    assert_eq!(h.bridge.user_id(), None);
}

#[tokio::test]
async fn test_connect_after_disconnect_opens_new_session() {
    let mut h = Harness::new();
    let _first = h.connect("u1").await;
    h.bridge.disconnect().await;

    let _second = h.connect("u2").await;
    assert_eq!(h.transport.opens.load(Ordering::SeqCst), 2);
    assert_eq!(h.bridge.user_id().as_deref(), Some("u2"));
}

// ── dispatch and fan-out ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_private_message_reaches_handlers_in_order() {
    let mut h = Harness::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    h.bridge.on_message(recorder(&log, "a"));
    h.bridge.on_message(recorder(&log, "b"));
    h.bridge.on_message(recorder(&log, "c"));
    let mut rx = h.bridge.subscribe();

    let conn = h.connect("u7").await;
    conn.push_private("u7", payload("announcement", "hello")).await;

    let n = next_notification(&mut rx).await;
    assert_eq!(n.title, "hello");
    assert_eq!(n.course_id, Some(3));
    assert_eq!(*log.lock().unwrap(), vec!["a:hello", "b:hello", "c:hello"]);
}

#[tokio::test]
async fn test_broadcast_message_is_dispatched() {
    let mut h = Harness::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    h.bridge.on_message(recorder(&log, "h"));
    let mut rx = h.bridge.subscribe();

    let conn = h.connect("u1").await;
    conn.push("sub-1", "/topic/notification", payload("cancel", "no class"))
        .await;

    next_notification(&mut rx).await;
    assert_eq!(*log.lock().unwrap(), vec!["h:no class"]);
}

#[tokio::test]
async fn test_failing_handler_does_not_block_others() {
    let mut h = Harness::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    h.bridge.on_message(recorder(&log, "first"));
    h.bridge.on_message(|_n: &Notification| -> Result<()> { bail!("handler error") });
    h.bridge.on_message(|_n: &Notification| -> Result<()> { panic!("handler panic") });
    h.bridge.on_message(recorder(&log, "last"));
    let mut rx = h.bridge.subscribe();

    let conn = h.connect("u1").await;
    conn.push_private("u1", payload("homework", "one")).await;
    next_notification(&mut rx).await;
    conn.push_private("u1", payload("homework", "two")).await;
    next_notification(&mut rx).await;

    assert_eq!(
        *log.lock().unwrap(),
        vec!["first:one", "last:one", "first:two", "last:two"]
    );
    assert_eq!(h.bridge.stats().handler_failures, 4);
    assert!(h.bridge.is_connected());
}

#[tokio::test]
async fn test_off_message_stops_delivery() {
    let mut h = Harness::new();
    let removed = Arc::new(Mutex::new(Vec::new()));
    let kept = Arc::new(Mutex::new(Vec::new()));
    let id = h.bridge.on_message(recorder(&removed, "removed"));
    h.bridge.on_message(recorder(&kept, "kept"));
    let mut rx = h.bridge.subscribe();

    assert!(h.bridge.off_message(id));
    assert!(!h.bridge.off_message(id));

    let conn = h.connect("u1").await;
    conn.push_private("u1", payload("announcement", "x")).await;
    next_notification(&mut rx).await;

    assert!(removed.lock().unwrap().is_empty());
    assert_eq!(kept.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_alert_severity_follows_notification_type() {
    let mut h = Harness::new();
    let mut rx = h.bridge.subscribe();
    let conn = h.connect("u1").await;

    conn.push_private("u1", payload("exam", "final")).await;
    next_notification(&mut rx).await;
    conn.push_private("u1", payload("field-trip", "zoo")).await;
    next_notification(&mut rx).await;

    let alerts = h.alerts.alerts.lock().unwrap();
    assert_eq!(alerts.len(), 2);
    assert_eq!(alerts[0].title, "final");
    assert_eq!(alerts[0].level, AlertLevel::Error);
    assert_eq!(alerts[0].duration, Duration::from_millis(5000));
    assert_eq!(alerts[1].level, AlertLevel::Info);
}

#[tokio::test]
async fn test_panicking_alert_sink_keeps_session_alive() {
    let mut h = Harness::new();
    h.alerts.panic_on_show.store(true, Ordering::SeqCst);
    let log = Arc::new(Mutex::new(Vec::new()));
    h.bridge.on_message(recorder(&log, "h"));
    let mut rx = h.bridge.subscribe();

    let conn = h.connect("u1").await;
    conn.push_private("u1", payload("exam", "one")).await;
    next_notification(&mut rx).await;
    conn.push_private("u1", payload("exam", "two")).await;
    next_notification(&mut rx).await;

    assert_eq!(*log.lock().unwrap(), vec!["h:one", "h:two"]);
    assert!(h.bridge.is_connected());
    assert_eq!(h.bridge.user_id().as_deref(), Some("u1"));
    assert_eq!(h.transport.opens.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_null_type_payload_is_delivered() {
    let mut h = Harness::new();
    let mut rx = h.bridge.subscribe();
    let conn = h.connect("u1").await;

    let body = json!({
        "notificationId": 9,
        "title": "untyped",
        "content": "body",
        "notificationType": null,
        "priority": 7,
        "courseId": null
    })
    .to_string();
    conn.push_private("u1", body).await;

    let n = next_notification(&mut rx).await;
    assert_eq!(n.title, "untyped");
    assert_eq!(n.priority, None);
    assert_eq!(h.alerts.alerts.lock().unwrap()[0].level, AlertLevel::Info);
    assert_eq!(h.bridge.stats().malformed, 0);
}

#[tokio::test]
async fn test_malformed_payload_is_dropped() {
    let mut h = Harness::new();
    let mut rx = h.bridge.subscribe();
    let conn = h.connect("u1").await;

    conn.push_private("u1", "{not json".to_string()).await;
    conn.push_private("u1", payload("announcement", "after")).await;

    let n = next_notification(&mut rx).await;
    assert_eq!(n.title, "after");
    let stats = h.bridge.stats();
    assert_eq!(stats.received, 2);
    assert_eq!(stats.malformed, 1);
    assert!(h.bridge.is_connected());
}

#[tokio::test]
async fn test_error_frame_after_connect_is_not_fatal() {
    let mut h = Harness::new();
    let mut rx = h.bridge.subscribe();
    let conn = h.connect("u1").await;

    conn.send(Frame::new(Command::Error).header("message", "something odd"))
        .await;
    conn.push_private("u1", payload("announcement", "still here")).await;

    assert_eq!(next_notification(&mut rx).await.title, "still here");
    assert!(h.bridge.is_connected());
    assert_eq!(h.transport.opens.load(Ordering::SeqCst), 1);
}

// ── reconnection ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_reconnects_after_transport_drop() {
    let mut h = Harness::new();
    let mut rx = h.bridge.subscribe();
    let conn = h.connect("u1").await;

    drop(conn);

    let mut conn = h.accept().await;
    let subscriptions = conn.handshake("0,0").await;
    assert_eq!(
        subscriptions[0].get("destination"),
        Some("/user/u1/queue/notification")
    );
    h.wait_for(ConnectionState::Connected).await;

    conn.push_private("u1", payload("announcement", "back")).await;
    assert_eq!(next_notification(&mut rx).await.title, "back");

    let stats = h.bridge.stats();
    assert_eq!(stats.handshakes, 2);
    assert!(stats.reconnects >= 1);
}

#[tokio::test]
async fn test_rejected_connect_is_retried() {
    let mut h = Harness::new();
    h.bridge.connect("u1");

    let mut first = h.accept().await;
    assert_eq!(first.recv_frame().await.command, Command::Connect);
    first
        .send(Frame::new(Command::Error).header("message", "not ready"))
        .await;

    let mut second = h.accept().await;
    second.handshake("0,0").await;
    h.wait_for(ConnectionState::Connected).await;
    assert_eq!(h.bridge.stats().handshakes, 1);
}

#[tokio::test]
async fn test_disconnect_cancels_pending_retry() {
    let mut h = Harness::new();
    h.transport.refuse.store(true, Ordering::SeqCst);

    h.bridge.connect("u1");
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(!h.bridge.is_connected());

    tokio::time::timeout(Duration::from_secs(1), h.bridge.disconnect())
        .await
        .expect("disconnect should not wait for the retry timer");

    h.transport.refuse.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.transport.opens.load(Ordering::SeqCst), 0);
    assert_eq!(h.bridge.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_no_reconnect_when_delay_is_zero() {
    let mut config = test_config();
    config.broker.reconnect_delay_ms = 0;
    let mut h = Harness::with_config(config);

    let conn = h.connect("u1").await;
    drop(conn);
    h.wait_for(ConnectionState::Disconnected).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.transport.opens.load(Ordering::SeqCst), 1);

    // The finished session does not block a fresh connect
    let _conn = h.connect("u1").await;
    assert_eq!(h.transport.opens.load(Ordering::SeqCst), 2);
}

// ── heart-beats ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_outgoing_heartbeats_are_sent() {
    let mut config = test_config();
    config.stomp.heartbeat_outgoing_ms = 50;
    let mut h = Harness::with_config(config);

    h.bridge.connect("u1");
    let mut conn = h.accept().await;
    // Broker wants a heart-beat every 50ms
    conn.handshake("0,50").await;

    let mut saw_heartbeat = false;
    for _ in 0..10 {
        if conn.recv_raw().await.as_deref() == Some("\n") {
            saw_heartbeat = true;
            break;
        }
    }
    assert!(saw_heartbeat);
}

#[tokio::test]
async fn test_silent_broker_is_treated_as_dropped() {
    let mut config = test_config();
    config.stomp.heartbeat_incoming_ms = 50;
    let mut h = Harness::with_config(config);

    h.bridge.connect("u1");
    let mut conn = h.accept().await;
    // Broker promises heart-beats every 50ms but never sends any
    conn.handshake("50,0").await;
    h.wait_for(ConnectionState::Connected).await;

    // Client gives up and opens a fresh connection
    let _next = h.accept().await;
    assert_eq!(h.transport.opens.load(Ordering::SeqCst), 2);
    drop(conn);
}
