//! Pending-lead staging: AI-triaged candidates wait here for a human to approve or reject them.

use crate::leads;
use crate::model::{
    Alert, Lead, LeadKind, LeadMessage, LeadStatus, NewPendingLead, PendingLead,
};
use crate::phone::DEFAULT_COUNTRY_CODE;
use crate::store::{StageOutcome, Store, StoreError};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

pub const ALERT_KIND_PENDING_LEAD: &str = "pending_lead";
const ALERT_TITLE: &str = "ליד חדש ממתין לאישור";

#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error("pending lead not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct Staging {
    store: Arc<dyn Store>,
    ttl: Duration,
    country_code: String,
}

impl Staging {
    pub fn new(store: Arc<dyn Store>, ttl_days: i64) -> Self {
        Self {
            store,
            ttl: Duration::days(ttl_days.max(1)),
            country_code: DEFAULT_COUNTRY_CODE.to_string(),
        }
    }

    /// Country code used when matching an approved phone against existing leads.
    pub fn with_country_code(mut self, country_code: impl Into<String>) -> Self {
        self.country_code = country_code.into();
        self
    }

    /// Stage a candidate unless one is already pending for (agency, phone); alert only on creation.
    ///
    /// When the alert cannot be written the new pending lead is removed again, so a redelivery
    /// stages and alerts afresh instead of finding a pending lead nobody was told about.
    pub async fn stage(&self, candidate: NewPendingLead) -> Result<StageOutcome, StoreError> {
        let pending = candidate.into_pending(Utc::now(), self.ttl);
        let alert = pending_alert(&pending);
        let outcome = self.store.stage_pending_lead(pending).await?;
        if let StageOutcome::Created(id) = &outcome {
            if let Err(e) = self.store.insert_alert(alert).await {
                log::error!(
                    "staging: alert for pending lead {} not created ({}); removing it",
                    id,
                    e
                );
                if let Err(del) = self.store.delete_pending_lead(id).await {
                    log::error!(
                        "staging: pending lead {} left without an alert: {}",
                        id,
                        del
                    );
                }
                return Err(e);
            }
        }
        Ok(outcome)
    }

    /// Turn a pending lead into a lead with its first message (already read), then drop the pending entry.
    ///
    /// An existing lead with the same phone is reused, so retrying after a half-finished approval
    /// does not create a second lead. If the final delete fails the lead is still returned and the
    /// leftover pending entry is logged.
    pub async fn approve(
        &self,
        pending_id: &str,
        name: &str,
        kind: LeadKind,
    ) -> Result<Lead, StagingError> {
        let pending = self
            .store
            .get_pending_lead(pending_id)
            .await?
            .ok_or_else(|| StagingError::NotFound(pending_id.to_string()))?;

        let lead = match leads::find_lead_by_phone(
            self.store.as_ref(),
            &pending.agency_id,
            &pending.phone,
            &self.country_code,
        )
        .await?
        {
            Some(existing) => {
                log::info!(
                    "staging: approving {} into existing lead {} (agency={})",
                    pending.id,
                    existing.id,
                    pending.agency_id
                );
                existing
            }
            None => {
                let name = name.trim();
                let lead = Lead {
                    id: uuid::Uuid::new_v4().to_string(),
                    agency_id: pending.agency_id.clone(),
                    name: if name.is_empty() {
                        pending.phone.clone()
                    } else {
                        name.to_string()
                    },
                    phone: pending.phone.clone(),
                    kind,
                    status: LeadStatus::New,
                    source: "whatsapp".to_string(),
                    created_at: Utc::now(),
                    last_message_at: None,
                    unread_count: 0,
                };
                self.store.insert_lead(lead.clone()).await?;
                lead
            }
        };

        let mut message = LeadMessage::inbound(
            pending.initial_message.clone(),
            pending.phone.clone(),
            pending.initial_message_id.clone(),
            pending.created_at,
        );
        message.is_read = true;
        self.store.append_message(&lead.id, message).await?;

        if let Err(e) = self.store.delete_pending_lead(&pending.id).await {
            log::error!(
                "staging: lead {} created but pending lead {} was not deleted: {}",
                lead.id,
                pending.id,
                e
            );
        }
        // Re-read so counters reflect the appended message.
        Ok(self.store.get_lead(&lead.id).await?.unwrap_or(lead))
    }

    /// Delete the pending lead regardless of its status. Returns false when it did not exist.
    pub async fn reject(&self, pending_id: &str) -> Result<bool, StoreError> {
        self.store.delete_pending_lead(pending_id).await
    }

    pub async fn list(&self, agency_id: &str) -> Result<Vec<PendingLead>, StoreError> {
        self.store.list_pending_leads(agency_id).await
    }

    /// Cleanup for external tooling; the router never calls this.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        self.store.purge_expired_pending(now).await
    }
}

fn pending_alert(pending: &PendingLead) -> Alert {
    let summary = if pending.ai_summary.is_empty() {
        pending.initial_message.as_str()
    } else {
        pending.ai_summary.as_str()
    };
    Alert {
        id: uuid::Uuid::new_v4().to_string(),
        agency_id: pending.agency_id.clone(),
        target_agent_id: "all".to_string(),
        kind: ALERT_KIND_PENDING_LEAD.to_string(),
        title: ALERT_TITLE.to_string(),
        message: format!("{} ({})", summary, pending.phone),
        link: format!("/leads/pending/{}", pending.id),
        is_read: false,
        created_at: pending.created_at,
    }
}
