//! CRM records touched by the router: leads, their messages, pending leads, draft properties and alerts.
//!
//! All records are partitioned by `agency_id`. Wire names are camelCase to match the dashboard's documents.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Tenant identifier.
pub type AgencyId = String;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadStatus {
    #[default]
    New,
    Contacted,
    Qualified,
    Closed,
    Lost,
}

/// What the lead is after; set by a human on approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadKind {
    Buyer,
    Seller,
    Renter,
    Landlord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: String,
    pub agency_id: AgencyId,
    pub name: String,
    /// Local-format phone (see [`crate::phone`]); the join key for inbound routing.
    pub phone: String,
    #[serde(rename = "type")]
    pub kind: LeadKind,
    pub status: LeadStatus,
    pub source: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub unread_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// One message in a lead's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadMessage {
    pub id: String,
    pub text: String,
    pub direction: Direction,
    pub sender_phone: String,
    /// Provider message id; unique per lead when present.
    #[serde(default)]
    pub external_message_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub is_read: bool,
}

impl LeadMessage {
    pub fn inbound(
        text: impl Into<String>,
        sender_phone: impl Into<String>,
        external_message_id: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            direction: Direction::Inbound,
            sender_phone: sender_phone.into(),
            external_message_id,
            timestamp,
            is_read: false,
        }
    }
}

/// Intent reported by triage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Buy,
    Rent,
    Sell,
    #[default]
    Inquiry,
}

impl Intent {
    /// Lenient parse of a model-supplied intent; anything unknown is an inquiry.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "buy" => Intent::Buy,
            "rent" => Intent::Rent,
            "sell" => Intent::Sell,
            _ => Intent::Inquiry,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Intent::Buy => "buy",
            Intent::Rent => "rent",
            Intent::Sell => "sell",
            Intent::Inquiry => "inquiry",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

/// AI-triaged candidate lead waiting for a human decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingLead {
    pub id: String,
    pub agency_id: AgencyId,
    pub phone: String,
    pub initial_message: String,
    /// Provider id of the message that created this entry; carried onto the lead message on approval.
    #[serde(default)]
    pub initial_message_id: Option<String>,
    pub ai_summary: String,
    pub ai_intent: Intent,
    pub status: PendingStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PendingLead {
    pub fn is_active(&self) -> bool {
        self.status == PendingStatus::Pending
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Draft input for staging a pending lead.
#[derive(Debug, Clone)]
pub struct NewPendingLead {
    pub agency_id: AgencyId,
    pub phone: String,
    pub initial_message: String,
    pub initial_message_id: Option<String>,
    pub ai_summary: String,
    pub ai_intent: Intent,
}

impl NewPendingLead {
    pub fn into_pending(self, now: DateTime<Utc>, ttl: Duration) -> PendingLead {
        PendingLead {
            id: uuid::Uuid::new_v4().to_string(),
            agency_id: self.agency_id,
            phone: self.phone,
            initial_message: self.initial_message,
            initial_message_id: self.initial_message_id,
            ai_summary: self.ai_summary,
            ai_intent: self.ai_intent,
            status: PendingStatus::Pending,
            created_at: now,
            expires_at: now + ttl,
        }
    }
}

/// Listing scraped from a group chat; needs manual promotion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftProperty {
    pub id: String,
    pub agency_id: AgencyId,
    /// Always "group-derived".
    pub source: String,
    pub group_id: String,
    pub external_agent_phone: String,
    pub raw_description: String,
    /// Always "draft".
    pub status: String,
    #[serde(default)]
    pub external_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Dashboard notification record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub agency_id: AgencyId,
    /// "all" broadcasts to every agent of the agency.
    pub target_agent_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    pub link: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}
