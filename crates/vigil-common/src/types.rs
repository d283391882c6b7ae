use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status shared by devices, rules, alarms and users.
///
/// # Examples
///
/// ```
/// use vigil_common::types::Status;
///
/// let status: Status = "disabled".parse().unwrap();
/// assert_eq!(status, Status::Disabled);
/// assert_eq!(status.to_string(), "disabled");
/// assert!(Status::Active.is_active());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Active,
    Disabled,
}

impl Status {
    pub fn is_active(self) -> bool {
        self == Status::Active
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Active => write!(f, "active"),
            Status::Disabled => write!(f, "disabled"),
        }
    }
}

impl std::str::FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(Status::Active),
            "disabled" => Ok(Status::Disabled),
            _ => Err(format!("unknown status: {s}")),
        }
    }
}

/// Notification channel an alarm dispatches through.
///
/// `Unspecified` alarms are never dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmType {
    #[default]
    Unspecified,
    App,
    Sms,
    Email,
}

impl std::fmt::Display for AlarmType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlarmType::Unspecified => write!(f, "unspecified"),
            AlarmType::App => write!(f, "app"),
            AlarmType::Sms => write!(f, "sms"),
            AlarmType::Email => write!(f, "email"),
        }
    }
}

impl std::str::FromStr for AlarmType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "unspecified" | "" => Ok(AlarmType::Unspecified),
            "app" => Ok(AlarmType::App),
            "sms" => Ok(AlarmType::Sms),
            "email" => Ok(AlarmType::Email),
            _ => Err(format!("unknown alarm type: {s}")),
        }
    }
}

/// Outcome of one notification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Sent,
    Error,
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertStatus::Sent => write!(f, "sent"),
            AlertStatus::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for AlertStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sent" => Ok(AlertStatus::Sent),
            "error" => Ok(AlertStatus::Error),
            _ => Err(format!("unknown alert status: {s}")),
        }
    }
}

/// Normalizes an externally supplied device identifier.
///
/// # Examples
///
/// ```
/// use vigil_common::types::normalize_unique_id;
///
/// assert_eq!(normalize_unique_id(" Dev-01 "), "dev-01");
/// ```
pub fn normalize_unique_id(unique_id: &str) -> String {
    unique_id.trim().to_lowercase()
}

/// A tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Org {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A telemetry source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub org_id: String,
    /// Lower-case external identifier, unique across all orgs.
    pub unique_id: String,
    pub name: String,
    pub status: Status,
    #[serde(skip_serializing)]
    pub token: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A condition over one attribute of points from devices carrying `device_tag`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub org_id: String,
    pub name: String,
    pub status: Status,
    pub device_tag: String,
    pub attr: String,
    pub expr: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A notification policy attached to exactly one rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alarm {
    pub id: String,
    pub org_id: String,
    pub rule_id: String,
    pub name: String,
    pub status: Status,
    pub alarm_type: AlarmType,
    /// Users sharing any of these tags are recipients.
    pub user_tags: Vec<String>,
    pub subject_template: String,
    pub body_template: String,
    /// Minimum seconds between notifications for the same device and user.
    /// Zero means "use the pipeline default".
    pub repeat_interval_secs: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Alarm {
    /// Whether the Alerter should consider this alarm at all.
    pub fn is_dispatchable(&self) -> bool {
        self.status.is_active() && self.alarm_type != AlarmType::Unspecified
    }
}

/// A notification recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub org_id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub app_key: String,
    pub role: String,
    pub status: Status,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Returns the contact detail the given channel delivers to, if the user
    /// has one.
    pub fn contact_for(&self, alarm_type: AlarmType) -> Option<&str> {
        let contact = match alarm_type {
            AlarmType::App => &self.app_key,
            AlarmType::Sms => &self.phone,
            AlarmType::Email => &self.email,
            AlarmType::Unspecified => return None,
        };
        (!contact.is_empty()).then_some(contact.as_str())
    }

    pub fn shares_tag(&self, tags: &[String]) -> bool {
        self.tags.iter().any(|t| tags.contains(t))
    }
}

/// A materialized rule match. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub org_id: String,
    pub unique_id: String,
    pub rule_id: String,
    /// Timestamp of the point that matched.
    pub created_at: DateTime<Utc>,
    pub trace_id: String,
}

/// The outcome of one notification attempt. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub org_id: String,
    pub unique_id: String,
    pub alarm_id: String,
    pub user_id: String,
    pub status: AlertStatus,
    pub error: String,
    pub created_at: DateTime<Utc>,
    pub trace_id: String,
}
