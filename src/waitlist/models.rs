/// Waitlist data models
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Enrollment record as stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitlistEntry {
    pub id: String,
    pub email: String,
    pub name: String,
    pub access_code: String,
    /// Set once the owner confirms their email
    pub discovered_archive: bool,
    pub referral_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied by the workflow on insert; everything else is store-assigned
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub name: String,
    pub email: String,
    pub access_code: String,
}

/// Signup request as sent by the landing page
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    // Missing fields fall through to validation and come back as a rejection
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub referral_code: Option<String>,
    #[serde(default)]
    pub utm_source: Option<String>,
    #[serde(default)]
    pub utm_campaign: Option<String>,
}

impl JoinRequest {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            ..Default::default()
        }
    }

    pub fn referred_by(mut self, code: impl Into<String>) -> Self {
        self.referral_code = Some(code.into());
        self
    }
}

/// Result of one enrollment attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// A new record was created
    Joined {
        access_code: String,
        position: i64,
        referral_link: String,
    },
    /// The email is already on the list; nothing was written
    AlreadyRegistered { access_code: String, position: i64 },
    /// The input was unusable; the store was not touched
    Rejected { message: String },
    /// The store failed or something unexpected happened
    Failed { message: String },
}

impl JoinOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JoinOutcome::Joined { .. })
    }

    pub fn access_code(&self) -> Option<&str> {
        match self {
            JoinOutcome::Joined { access_code, .. }
            | JoinOutcome::AlreadyRegistered { access_code, .. } => Some(access_code),
            _ => None,
        }
    }

    pub fn position(&self) -> Option<i64> {
        match self {
            JoinOutcome::Joined { position, .. }
            | JoinOutcome::AlreadyRegistered { position, .. } => Some(*position),
            _ => None,
        }
    }
}

/// Wire format returned to the landing page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitlistResponse {
    pub success: bool,
    /// The front end still calls the access code a founder code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub founder_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referral_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub const ALREADY_REGISTERED_MESSAGE: &str = "Email already registered";

impl From<JoinOutcome> for WaitlistResponse {
    fn from(outcome: JoinOutcome) -> Self {
        match outcome {
            JoinOutcome::Joined {
                access_code,
                position,
                referral_link,
            } => Self {
                success: true,
                founder_code: Some(access_code),
                position: Some(position),
                referral_link: Some(referral_link),
                error: None,
            },
            JoinOutcome::AlreadyRegistered {
                access_code,
                position,
            } => Self {
                success: false,
                founder_code: Some(access_code),
                position: Some(position),
                referral_link: None,
                error: Some(ALREADY_REGISTERED_MESSAGE.to_string()),
            },
            JoinOutcome::Rejected { message } | JoinOutcome::Failed { message } => Self {
                success: false,
                founder_code: None,
                position: None,
                referral_link: None,
                error: Some(message),
            },
        }
    }
}

/// Aggregate counters shown on the signup page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitlistStats {
    pub total: i64,
    pub today_count: i64,
}

/// Stats with store faults kept apart from an empty list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatsSnapshot {
    Available(WaitlistStats),
    Unavailable { reason: String },
}

impl StatsSnapshot {
    /// Zeros when unavailable, for display
    pub fn or_zero(&self) -> WaitlistStats {
        match self {
            StatsSnapshot::Available(stats) => *stats,
            StatsSnapshot::Unavailable { .. } => WaitlistStats::default(),
        }
    }
}

/// Analytics event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Signup,
    Verification,
    Referral,
    Share,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Signup => "signup",
            EventType::Verification => "verification",
            EventType::Referral => "referral",
            EventType::Share => "share",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "signup" => Some(EventType::Signup),
            "verification" => Some(EventType::Verification),
            "referral" => Some(EventType::Referral),
            "share" => Some(EventType::Share),
            _ => None,
        }
    }
}

/// Event to append to the analytics log
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub waitlist_id: String,
    pub event_type: EventType,
    pub event_data: serde_json::Value,
}

/// Stored analytics event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitlistEvent {
    pub id: String,
    pub waitlist_id: String,
    pub event_type: EventType,
    pub event_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
