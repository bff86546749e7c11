//! Persistence seam for CRM records.
//!
//! The router only talks to [`Store`]; the in-memory implementation optionally persists a JSON snapshot.
//! Operations that pair an existence check with a write (`stage_pending_lead`, `append_message`)
//! run the check and the write in one critical section.

mod memory;

pub use memory::MemoryStore;

use crate::model::{Alert, DraftProperty, Lead, LeadMessage, PendingLead};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("lead not found: {0}")]
    LeadNotFound(String),
    #[error("snapshot persistence failed: {0}")]
    Persist(#[from] std::io::Error),
    #[error("snapshot encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result of an atomic "stage unless already pending" write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Created(String),
    AlreadyPending(String),
}

/// Result of an atomic "insert unless a draft for this provider message exists" write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraftOutcome {
    Created(String),
    AlreadyDrafted(String),
}

/// Result of an atomic "append unless that provider id is already present" write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    Duplicate,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// First lead of the agency whose stored phone, normalized with `country_code`, equals `phone`
    /// (already normalized).
    async fn find_lead_by_phone(
        &self,
        agency_id: &str,
        phone: &str,
        country_code: &str,
    ) -> Result<Option<Lead>, StoreError>;

    async fn get_lead(&self, lead_id: &str) -> Result<Option<Lead>, StoreError>;

    async fn insert_lead(&self, lead: Lead) -> Result<(), StoreError>;

    async fn list_leads(&self, agency_id: &str) -> Result<Vec<Lead>, StoreError>;

    /// True if the lead already has a message with this provider id.
    async fn message_exists(
        &self,
        lead_id: &str,
        external_message_id: &str,
    ) -> Result<bool, StoreError>;

    /// Append a message and bump the lead's `lastMessageAt`/`unreadCount` for unread inbound messages.
    async fn append_message(
        &self,
        lead_id: &str,
        message: LeadMessage,
    ) -> Result<AppendOutcome, StoreError>;

    async fn list_messages(&self, lead_id: &str) -> Result<Vec<LeadMessage>, StoreError>;

    /// Insert unless an active pending lead exists for (agency, phone).
    async fn stage_pending_lead(&self, pending: PendingLead) -> Result<StageOutcome, StoreError>;

    async fn get_pending_lead(&self, id: &str) -> Result<Option<PendingLead>, StoreError>;

    async fn list_pending_leads(&self, agency_id: &str) -> Result<Vec<PendingLead>, StoreError>;

    /// Returns false when nothing was deleted.
    async fn delete_pending_lead(&self, id: &str) -> Result<bool, StoreError>;

    /// Delete pending leads whose `expiresAt` is at or before `now`; returns how many.
    async fn purge_expired_pending(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;

    /// Insert unless the agency already has a draft with the same external message id.
    /// Drafts without an external id are always inserted.
    async fn insert_draft_property(&self, draft: DraftProperty) -> Result<DraftOutcome, StoreError>;

    async fn list_draft_properties(&self, agency_id: &str)
        -> Result<Vec<DraftProperty>, StoreError>;

    async fn insert_alert(&self, alert: Alert) -> Result<(), StoreError>;

    async fn list_alerts(&self, agency_id: &str) -> Result<Vec<Alert>, StoreError>;
}
