use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

mod decode;

pub use decode::DecodeError;

/// Notification represents a course notification pushed by the broker.
///
/// The same record arrives on the private queue and the broadcast topic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Server-side notification id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_id: Option<i64>,

    pub title: String,

    pub content: String,

    /// announcement / homework / exam / cancel, or anything the server adds later
    #[serde(
        default = "default_notification_type",
        deserialize_with = "nullable_notification_type"
    )]
    pub notification_type: NotificationType,

    /// Codes outside 0..=2 decode as `None`
    #[serde(
        default,
        deserialize_with = "lenient_priority",
        skip_serializing_if = "Option::is_none"
    )]
    pub priority: Option<Priority>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_id: Option<i64>,
}

fn default_notification_type() -> NotificationType {
    NotificationType::Other(String::new())
}

// The server sends `null` for an unset type
fn nullable_notification_type<'de, D>(deserializer: D) -> Result<NotificationType, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .map(NotificationType::from)
        .unwrap_or_else(default_notification_type))
}

fn lenient_priority<'de, D>(deserializer: D) -> Result<Option<Priority>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<i64>::deserialize(deserializer)?.and_then(Priority::from_code))
}

impl Notification {
    /// Decode a notification from a raw message body.
    pub fn from_slice(body: &[u8]) -> Result<Self, DecodeError> {
        decode::decode(body)
    }

    /// Alert severity for this notification
    pub fn alert_level(&self) -> AlertLevel {
        self.notification_type.alert_level()
    }
}

/// Kind of course notification.
///
/// Unknown kinds are kept verbatim so they can still be forwarded to handlers.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationType {
    Announcement,
    Homework,
    Exam,
    Cancel,
    Other(String),
}

impl NotificationType {
    pub fn as_str(&self) -> &str {
        match self {
            NotificationType::Announcement => "announcement",
            NotificationType::Homework => "homework",
            NotificationType::Exam => "exam",
            NotificationType::Cancel => "cancel",
            NotificationType::Other(s) => s,
        }
    }

    /// Fixed severity table; anything not listed is informational.
    pub fn alert_level(&self) -> AlertLevel {
        match self {
            NotificationType::Announcement => AlertLevel::Info,
            NotificationType::Homework => AlertLevel::Warning,
            NotificationType::Exam => AlertLevel::Error,
            NotificationType::Cancel => AlertLevel::Warning,
            NotificationType::Other(_) => AlertLevel::Info,
        }
    }
}

impl From<String> for NotificationType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "announcement" => NotificationType::Announcement,
            "homework" => NotificationType::Homework,
            "exam" => NotificationType::Exam,
            "cancel" => NotificationType::Cancel,
            _ => NotificationType::Other(s),
        }
    }
}

impl From<NotificationType> for String {
    fn from(t: NotificationType) -> Self {
        match t {
            NotificationType::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification priority (0 = normal, 1 = important, 2 = urgent)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(into = "u8")]
pub enum Priority {
    Normal,
    Important,
    Urgent,
}

impl Priority {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Priority::Normal),
            1 => Some(Priority::Important),
            2 => Some(Priority::Urgent),
            _ => None,
        }
    }
}

impl From<Priority> for u8 {
    fn from(p: Priority) -> Self {
        match p {
            Priority::Normal => 0,
            Priority::Important => 1,
            Priority::Urgent => 2,
        }
    }
}

/// User-visible alert severity
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Success,
    Info,
    Warning,
    Error,
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertLevel::Success => "success",
            AlertLevel::Info => "info",
            AlertLevel::Warning => "warning",
            AlertLevel::Error => "error",
        };
        f.write_str(s)
    }
}
