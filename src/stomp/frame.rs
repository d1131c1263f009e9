use std::fmt;
use std::str::FromStr;

/// STOMP frame commands (client and server)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Connect,
    Stomp,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Ack,
    Nack,
    Begin,
    Commit,
    Abort,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Stomp => "STOMP",
            Command::Connected => "CONNECTED",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Ack => "ACK",
            Command::Nack => "NACK",
            Command::Begin => "BEGIN",
            Command::Commit => "COMMIT",
            Command::Abort => "ABORT",
            Command::Disconnect => "DISCONNECT",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }

    /// CONNECT and CONNECTED headers are never escaped (STOMP 1.2)
    fn escapes_headers(&self) -> bool {
        !matches!(self, Command::Connect | Command::Stomp | Command::Connected)
    }
}

impl FromStr for Command {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cmd = match s {
            "CONNECT" => Command::Connect,
            "STOMP" => Command::Stomp,
            "CONNECTED" => Command::Connected,
            "SEND" => Command::Send,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "ACK" => Command::Ack,
            "NACK" => Command::Nack,
            "BEGIN" => Command::Begin,
            "COMMIT" => Command::Commit,
            "ABORT" => Command::Abort,
            "DISCONNECT" => Command::Disconnect,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            other => return Err(FrameError::UnknownCommand(other.to_string())),
        };
        Ok(cmd)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Frame decoding errors
#[derive(Debug, Clone, PartialEq)]
pub enum FrameError {
    UnknownCommand(String),
    InvalidHeader(String),
    InvalidEscape(String),
    InvalidContentLength(String),
    MissingNul,
    NotUtf8,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::UnknownCommand(c) => write!(f, "unknown STOMP command '{}'", c),
            FrameError::InvalidHeader(h) => write!(f, "invalid header line '{}'", h),
            FrameError::InvalidEscape(h) => write!(f, "invalid escape sequence in '{}'", h),
            FrameError::InvalidContentLength(v) => write!(f, "invalid content-length '{}'", v),
            FrameError::MissingNul => write!(f, "frame body is not terminated by NUL"),
            FrameError::NotUtf8 => write!(f, "frame headers are not valid UTF-8"),
        }
    }
}

impl std::error::Error for FrameError {}

/// A single STOMP frame.
///
/// Headers keep wire order; on repeated names the first one wins.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Lookup a header value by name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Serialize to wire text.
    ///
    /// A content-length header is added when the body is non-empty and the
    /// caller did not set one.
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');

        for (name, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }

        if !self.body.is_empty() && self.get("content-length").is_none() {
            out.push_str(&format!("content-length:{}\n", self.body.len()));
        }

        out.push('\n');
        out.push_str(&String::from_utf8_lossy(&self.body));
        out.push('\0');
        out
    }
}

fn escape_header(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(s: &str) -> Result<String, FrameError> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(FrameError::InvalidEscape(s.to_string())),
        }
    }
    Ok(out)
}

/// Output of the streaming decoder
#[derive(Clone, Debug, PartialEq)]
pub enum Incoming {
    /// A bare EOL between frames
    Heartbeat,
    Frame(Frame),
}

/// Streaming STOMP decoder.
///
/// Transports may split a frame across several messages or pack several
/// frames into one, so bytes are buffered until a whole frame is available.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes waiting for the rest of a frame
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Pull the next complete item, or `None` if more data is needed.
    pub fn next_item(&mut self) -> Option<Result<Incoming, FrameError>> {
        if self.buf.starts_with(b"\r\n") {
            self.buf.drain(..2);
            return Some(Ok(Incoming::Heartbeat));
        }
        if self.buf.starts_with(b"\n") {
            self.buf.drain(..1);
            return Some(Ok(Incoming::Heartbeat));
        }
        if self.buf.is_empty() {
            return None;
        }

        let (head_end, body_start) = find_head_end(&self.buf)?;

        let head = match std::str::from_utf8(&self.buf[..head_end]) {
            Ok(h) => h.to_string(),
            Err(_) => {
                self.skip_frame(body_start);
                return Some(Err(FrameError::NotUtf8));
            }
        };

        let (command, headers) = match parse_head(&head) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.skip_frame(body_start);
                return Some(Err(e));
            }
        };

        let content_length = headers
            .iter()
            .find(|(k, _)| k == "content-length")
            .map(|(_, v)| v.clone());

        let body_end = match content_length {
            Some(raw) => {
                let len = match raw.trim().parse::<usize>() {
                    Ok(len) => len,
                    Err(_) => {
                        self.skip_frame(body_start);
                        return Some(Err(FrameError::InvalidContentLength(raw)));
                    }
                };
                if self.buf.len() < body_start + len + 1 {
                    return None;
                }
                if self.buf[body_start + len] != 0 {
                    self.skip_frame(body_start + len);
                    return Some(Err(FrameError::MissingNul));
                }
                body_start + len
            }
            None => {
                let nul = self.buf[body_start..].iter().position(|b| *b == 0)?;
                body_start + nul
            }
        };

        let body = self.buf[body_start..body_end].to_vec();
        self.buf.drain(..=body_end);

        Some(Ok(Incoming::Frame(Frame {
            command,
            headers,
            body,
        })))
    }

    /// Discard a bad frame up to and including its NUL (or everything buffered)
    fn skip_frame(&mut self, from: usize) {
        match self.buf[from..].iter().position(|b| *b == 0) {
            Some(nul) => {
                self.buf.drain(..=from + nul);
            }
            None => self.buf.clear(),
        }
    }
}

/// Locate the blank line ending the command/header block.
///
/// Returns (end of header text, start of body).
fn find_head_end(buf: &[u8]) -> Option<(usize, usize)> {
    let mut i = 0;
    while i < buf.len() {
        if buf[i] == b'\n' {
            if buf.get(i + 1) == Some(&b'\n') {
                return Some((i, i + 2));
            }
            if buf.get(i + 1) == Some(&b'\r') && buf.get(i + 2) == Some(&b'\n') {
                return Some((i, i + 3));
            }
        }
        i += 1;
    }
    None
}

fn parse_head(head: &str) -> Result<(Command, Vec<(String, String)>), FrameError> {
    let mut lines = head.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l));

    let command: Command = lines.next().unwrap_or_default().parse()?;
    let escape = command.escapes_headers();

    let mut headers = Vec::new();
    for line in lines {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| FrameError::InvalidHeader(line.to_string()))?;
        if escape {
            headers.push((unescape_header(name)?, unescape_header(value)?));
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    Ok((command, headers))
}
