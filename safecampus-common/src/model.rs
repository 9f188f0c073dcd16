//! Canonical domain model for the SafeCampus relay
//!
//! Collapses the enumerations that accumulated over the system's evolution
//! into one canonical set per field. Legacy persisted values are still
//! readable through the `FromStr` implementations (see the compatibility
//! notes on each enum).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::Error;

/// Report status.
///
/// `Resolved` and `FalseAlarm` are terminal: once a record reaches either,
/// no further automatic scoring or status transition may mutate it.
///
/// Compatibility: legacy rows may carry `active` (read as `needs_review`)
/// or `real` (read as `confirmed_real`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Verified,
    NeedsReview,
    Unverified,
    Investigating,
    ConfirmedReal,
    PendingReview,
    Resolved,
    FalseAlarm,
}

impl ReportStatus {
    /// Stable string form used on the wire and in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Verified => "verified",
            ReportStatus::NeedsReview => "needs_review",
            ReportStatus::Unverified => "unverified",
            ReportStatus::Investigating => "investigating",
            ReportStatus::ConfirmedReal => "confirmed_real",
            ReportStatus::PendingReview => "pending_review",
            ReportStatus::Resolved => "resolved",
            ReportStatus::FalseAlarm => "false_alarm",
        }
    }

    /// Terminal statuses admit no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReportStatus::Resolved | ReportStatus::FalseAlarm)
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "verified" => Ok(ReportStatus::Verified),
            "needs_review" => Ok(ReportStatus::NeedsReview),
            "unverified" => Ok(ReportStatus::Unverified),
            "investigating" => Ok(ReportStatus::Investigating),
            "confirmed_real" => Ok(ReportStatus::ConfirmedReal),
            "pending_review" => Ok(ReportStatus::PendingReview),
            "resolved" => Ok(ReportStatus::Resolved),
            "false_alarm" => Ok(ReportStatus::FalseAlarm),
            // Legacy values from earlier schema revisions
            "active" => Ok(ReportStatus::NeedsReview),
            "real" => Ok(ReportStatus::ConfirmedReal),
            other => Err(Error::InvalidInput(format!("unknown report status: {}", other))),
        }
    }
}

/// Report priority, ordered from least to most urgent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(Error::InvalidInput(format!("unknown priority: {}", other))),
        }
    }
}

/// Incident category tag
///
/// Unknown values parse leniently to `Other` (the lowest-priority bucket)
/// rather than failing, since mobile clients of several vintages are live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Suspicious Person")]
    SuspiciousPerson,
    #[serde(rename = "Theft/Robbery")]
    TheftRobbery,
    #[serde(rename = "Vandalism")]
    Vandalism,
    #[serde(rename = "Drug Activity")]
    DrugActivity,
    #[serde(rename = "Harassment")]
    Harassment,
    #[serde(rename = "Safety Hazard")]
    SafetyHazard,
    #[serde(rename = "Unauthorized Access")]
    UnauthorizedAccess,
    #[serde(rename = "Other")]
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::SuspiciousPerson => "Suspicious Person",
            Category::TheftRobbery => "Theft/Robbery",
            Category::Vandalism => "Vandalism",
            Category::DrugActivity => "Drug Activity",
            Category::Harassment => "Harassment",
            Category::SafetyHazard => "Safety Hazard",
            Category::UnauthorizedAccess => "Unauthorized Access",
            Category::Other => "Other",
        }
    }

    /// Lenient parse: unknown labels land in `Other`
    pub fn parse_lenient(s: &str) -> Category {
        match s {
            "Suspicious Person" => Category::SuspiciousPerson,
            "Theft/Robbery" => Category::TheftRobbery,
            "Vandalism" => Category::Vandalism,
            "Drug Activity" => Category::DrugActivity,
            "Harassment" => Category::Harassment,
            "Safety Hazard" => Category::SafetyHazard,
            "Unauthorized Access" => Category::UnauthorizedAccess,
            _ => Category::Other,
        }
    }

    /// Categories that earn the fixed high-priority scoring bonus
    pub fn is_high_priority(&self) -> bool {
        matches!(
            self,
            Category::TheftRobbery
                | Category::Harassment
                | Category::DrugActivity
                | Category::UnauthorizedAccess
        )
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for Category {
    fn default() -> Self {
        Category::Other
    }
}

/// Operator-facing verification tag, derived 1:1 from the confidence tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerificationTag {
    #[serde(rename = "Verified")]
    Verified,
    #[serde(rename = "Needs Review")]
    NeedsReview,
    #[serde(rename = "Unverified")]
    Unverified,
}

impl VerificationTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationTag::Verified => "Verified",
            VerificationTag::NeedsReview => "Needs Review",
            VerificationTag::Unverified => "Unverified",
        }
    }
}

impl fmt::Display for VerificationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerificationTag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Verified" => Ok(VerificationTag::Verified),
            "Needs Review" => Ok(VerificationTag::NeedsReview),
            "Unverified" => Ok(VerificationTag::Unverified),
            other => Err(Error::InvalidInput(format!("unknown verification tag: {}", other))),
        }
    }
}

/// Connection role: security dashboard or end-user mobile device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Dashboard,
    Mobile,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Dashboard => "dashboard",
            Role::Mobile => "mobile",
        }
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dashboard" | "web" => Ok(Role::Dashboard),
            "mobile" => Ok(Role::Mobile),
            other => Err(Error::InvalidInput(format!("unknown client role: {}", other))),
        }
    }
}

/// Geolocation attached to a report or SOS event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campus: Option<String>,
}

/// A submitted safety incident record
///
/// The id is assigned at intake and never changes. All timestamps are
/// server-assigned at write time; client-supplied times are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub user_id: String,
    pub user_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_phone: Option<String>,
    pub description: String,
    pub location: Location,
    pub category: Category,
    pub evidence_images: Vec<String>,
    /// Heuristic authenticity estimate, 0-100
    pub confidence: u8,
    pub status: ReportStatus,
    pub priority: Priority,
    pub verification_tag: VerificationTag,
    pub explanation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// SOS lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SosStatus {
    Active,
    Ended,
}

/// One acknowledgment of an SOS by a friend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SosAck {
    pub friend_id: String,
    pub friend_name: String,
    pub acknowledged_at: DateTime<Utc>,
}

/// An ephemeral high-urgency distress broadcast
///
/// Lives only in the in-memory cache; evicted when the originating user
/// ends it or the process restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SosEvent {
    pub id: Uuid,
    pub user_id: String,
    pub user_name: String,
    pub location: Location,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub status: SosStatus,
    pub acknowledgments: Vec<SosAck>,
    pub raised_at: DateTime<Utc>,
}

/// Direct chat message type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    Image,
    Location,
    System,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::Location => "location",
            MessageType::System => "system",
        }
    }
}

impl FromStr for MessageType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageType::Text),
            "image" => Ok(MessageType::Image),
            "location" => Ok(MessageType::Location),
            "system" => Ok(MessageType::System),
            other => Err(Error::InvalidInput(format!("unknown message type: {}", other))),
        }
    }
}

impl Default for MessageType {
    fn default() -> Self {
        MessageType::Text
    }
}

/// A direct chat message between two users
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: String,
    pub sender_name: String,
    pub recipient_id: String,
    pub body: String,
    pub message_type: MessageType,
    pub is_read: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Friendship edge status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FriendStatus {
    Pending,
    Accepted,
    Blocked,
}

impl FriendStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FriendStatus::Pending => "pending",
            FriendStatus::Accepted => "accepted",
            FriendStatus::Blocked => "blocked",
        }
    }
}

impl FromStr for FriendStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(FriendStatus::Pending),
            "accepted" => Ok(FriendStatus::Accepted),
            "blocked" => Ok(FriendStatus::Blocked),
            other => Err(Error::InvalidInput(format!("unknown friend status: {}", other))),
        }
    }
}

/// A friendship edge owned by `user_id`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Friend {
    pub user_id: String,
    pub friend_id: String,
    pub friend_name: String,
    pub friend_email: String,
    pub friend_username: String,
    pub profile_color: String,
    pub status: FriendStatus,
    pub added_at: DateTime<Utc>,
}

/// A feedback vote on a report's authenticity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackVote {
    Real,
    Fake,
}

impl FeedbackVote {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackVote::Real => "real",
            FeedbackVote::Fake => "fake",
        }
    }
}

impl FromStr for FeedbackVote {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "real" => Ok(FeedbackVote::Real),
            "fake" => Ok(FeedbackVote::Fake),
            other => Err(Error::InvalidInput(format!("unknown feedback vote: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trip() {
        for status in [
            ReportStatus::Verified,
            ReportStatus::NeedsReview,
            ReportStatus::Unverified,
            ReportStatus::Investigating,
            ReportStatus::ConfirmedReal,
            ReportStatus::PendingReview,
            ReportStatus::Resolved,
            ReportStatus::FalseAlarm,
        ] {
            assert_eq!(status.as_str().parse::<ReportStatus>().unwrap(), status);
        }
    }

    #[test]
    fn status_legacy_compatibility() {
        assert_eq!("active".parse::<ReportStatus>().unwrap(), ReportStatus::NeedsReview);
        assert_eq!("real".parse::<ReportStatus>().unwrap(), ReportStatus::ConfirmedReal);
        assert!("bogus".parse::<ReportStatus>().is_err());
    }

    #[test]
    fn terminal_statuses() {
        assert!(ReportStatus::Resolved.is_terminal());
        assert!(ReportStatus::FalseAlarm.is_terminal());
        assert!(!ReportStatus::Verified.is_terminal());
        assert!(!ReportStatus::ConfirmedReal.is_terminal());
    }

    #[test]
    fn priority_ordering() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);
    }

    #[test]
    fn category_lenient_parse() {
        assert_eq!(Category::parse_lenient("Theft/Robbery"), Category::TheftRobbery);
        assert_eq!(Category::parse_lenient("Jaywalking"), Category::Other);
        assert_eq!(Category::parse_lenient(""), Category::Other);
    }

    #[test]
    fn high_priority_categories() {
        assert!(Category::TheftRobbery.is_high_priority());
        assert!(Category::DrugActivity.is_high_priority());
        assert!(!Category::SafetyHazard.is_high_priority());
        assert!(!Category::Other.is_high_priority());
    }

    #[test]
    fn role_parse_accepts_legacy_web() {
        assert_eq!("dashboard".parse::<Role>().unwrap(), Role::Dashboard);
        assert_eq!("web".parse::<Role>().unwrap(), Role::Dashboard);
        assert_eq!("mobile".parse::<Role>().unwrap(), Role::Mobile);
    }
}
