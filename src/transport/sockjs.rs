use anyhow::{bail, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::fmt;

/// Frames the SockJS server sends on every transport
#[derive(Clone, Debug, PartialEq)]
pub enum SockJsFrame {
    /// `o`
    Open,
    /// `h`
    Heartbeat,
    /// `a[...]` JSON array of text messages
    Messages(Vec<String>),
    /// `c[code,"reason"]`
    Close { code: u16, reason: String },
}

/// SockJS frame parse errors
#[derive(Debug, Clone, PartialEq)]
pub enum SockJsError {
    Empty,
    UnknownFrame(char),
    BadPayload(String),
}

impl fmt::Display for SockJsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SockJsError::Empty => write!(f, "empty SockJS frame"),
            SockJsError::UnknownFrame(c) => write!(f, "unknown SockJS frame type '{}'", c),
            SockJsError::BadPayload(e) => write!(f, "bad SockJS frame payload: {}", e),
        }
    }
}

impl std::error::Error for SockJsError {}

/// Parse a single SockJS frame (trailing newline from polling responses allowed)
pub fn parse_frame(raw: &str) -> Result<SockJsFrame, SockJsError> {
    let raw = raw.trim_end_matches(['\n', '\r']);
    let mut chars = raw.chars();
    let kind = chars.next().ok_or(SockJsError::Empty)?;
    let payload = chars.as_str();

    match kind {
        'o' => Ok(SockJsFrame::Open),
        'h' => Ok(SockJsFrame::Heartbeat),
        'a' => serde_json::from_str::<Vec<String>>(payload)
            .map(SockJsFrame::Messages)
            .map_err(|e| SockJsError::BadPayload(e.to_string())),
        'c' => serde_json::from_str::<(u16, String)>(payload)
            .map(|(code, reason)| SockJsFrame::Close { code, reason })
            .map_err(|e| SockJsError::BadPayload(e.to_string())),
        other => Err(SockJsError::UnknownFrame(other)),
    }
}

/// Client → server payload: a JSON array of strings
pub fn encode_send(messages: &[String]) -> String {
    // Vec<String> serialization cannot fail
    serde_json::to_string(messages).unwrap_or_else(|_| "[]".to_string())
}

/// Per-session URL layout: `{base}/{server_id}/{session_id}/{transport}`
#[derive(Clone, Debug)]
pub struct SessionUrl {
    base: String,
    server_id: String,
    session_id: String,
}

impl SessionUrl {
    /// Random server and session ids, as sockjs-client generates them
    pub fn generate(base: &str) -> Result<Self> {
        let mut rng = rand::thread_rng();
        let server_id = format!("{:03}", rng.gen_range(0..1000));
        let session_id: String = (&mut rng)
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(char::from)
            .collect();
        Self::with_ids(base, server_id, session_id)
    }

    pub fn with_ids(
        base: &str,
        server_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Result<Self> {
        let base = base.trim_end_matches('/');
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            bail!("SockJS endpoint must be an http(s) URL, got '{}'", base);
        }
        Ok(Self {
            base: base.to_string(),
            server_id: server_id.into(),
            session_id: session_id.into(),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn session_base(&self) -> String {
        format!("{}/{}/{}", self.base, self.server_id, self.session_id)
    }

    /// `ws(s)://…/websocket`
    pub fn websocket_url(&self) -> String {
        let url = format!("{}/websocket", self.session_base());
        if let Some(rest) = url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            url
        }
    }

    pub fn xhr_url(&self) -> String {
        format!("{}/xhr", self.session_base())
    }

    pub fn xhr_send_url(&self) -> String {
        format!("{}/xhr_send", self.session_base())
    }
}
