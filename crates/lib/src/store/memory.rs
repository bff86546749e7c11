//! In-memory [`Store`] with optional JSON snapshot persistence.

use super::{AppendOutcome, DraftOutcome, StageOutcome, Store, StoreError};
use crate::model::{Alert, Direction, DraftProperty, Lead, LeadMessage, PendingLead};
use crate::phone;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot {
    #[serde(default)]
    leads: Vec<Lead>,
    /// lead id -> messages in arrival order
    #[serde(default)]
    messages: HashMap<String, Vec<LeadMessage>>,
    #[serde(default)]
    pending_leads: Vec<PendingLead>,
    #[serde(default)]
    draft_properties: Vec<DraftProperty>,
    #[serde(default)]
    alerts: Vec<Alert>,
}

/// Records held behind one lock. Cloning shares the same data.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<Snapshot>>,
    path: Option<PathBuf>,
    /// When set, every call fails with `Unavailable` (used to exercise failure paths).
    offline: Arc<AtomicBool>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Snapshot::default())),
            path: None,
            offline: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Load from a snapshot file; a missing file starts empty. Later writes are saved back to `path`.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let snapshot = match tokio::fs::read_to_string(&path).await {
            Ok(s) => serde_json::from_str(&s)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("store snapshot not found, starting empty: {}", path.display());
                Snapshot::default()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            inner: Arc::new(RwLock::new(snapshot)),
            path: Some(path),
            offline: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Simulate an outage: while offline every operation returns `StoreError::Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("store is offline".to_string()))
        } else {
            Ok(())
        }
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(snapshot)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_lead_by_phone(
        &self,
        agency_id: &str,
        phone: &str,
        country_code: &str,
    ) -> Result<Option<Lead>, StoreError> {
        self.check_online()?;
        let g = self.inner.read().await;
        Ok(g.leads
            .iter()
            .find(|l| {
                l.agency_id == agency_id && phone::normalize_with(&l.phone, country_code) == phone
            })
            .cloned())
    }

    async fn get_lead(&self, lead_id: &str) -> Result<Option<Lead>, StoreError> {
        self.check_online()?;
        let g = self.inner.read().await;
        Ok(g.leads.iter().find(|l| l.id == lead_id).cloned())
    }

    async fn insert_lead(&self, lead: Lead) -> Result<(), StoreError> {
        self.check_online()?;
        let mut g = self.inner.write().await;
        g.leads.push(lead);
        self.save(&g).await
    }

    async fn list_leads(&self, agency_id: &str) -> Result<Vec<Lead>, StoreError> {
        self.check_online()?;
        let g = self.inner.read().await;
        Ok(g.leads
            .iter()
            .filter(|l| l.agency_id == agency_id)
            .cloned()
            .collect())
    }

    async fn message_exists(
        &self,
        lead_id: &str,
        external_message_id: &str,
    ) -> Result<bool, StoreError> {
        self.check_online()?;
        let g = self.inner.read().await;
        Ok(g.messages.get(lead_id).map_or(false, |msgs| {
            msgs.iter()
                .any(|m| m.external_message_id.as_deref() == Some(external_message_id))
        }))
    }

    async fn append_message(
        &self,
        lead_id: &str,
        message: LeadMessage,
    ) -> Result<AppendOutcome, StoreError> {
        self.check_online()?;
        let mut g = self.inner.write().await;
        let snapshot = &mut *g;
        let lead = snapshot
            .leads
            .iter_mut()
            .find(|l| l.id == lead_id)
            .ok_or_else(|| StoreError::LeadNotFound(lead_id.to_string()))?;
        let msgs = snapshot.messages.entry(lead_id.to_string()).or_default();
        if let Some(ext) = message.external_message_id.as_deref() {
            if msgs
                .iter()
                .any(|m| m.external_message_id.as_deref() == Some(ext))
            {
                return Ok(AppendOutcome::Duplicate);
            }
        }
        if message.direction == Direction::Inbound && !message.is_read {
            lead.unread_count += 1;
        }
        lead.last_message_at = Some(
            lead.last_message_at
                .map_or(message.timestamp, |t| t.max(message.timestamp)),
        );
        msgs.push(message);
        self.save(&g).await?;
        Ok(AppendOutcome::Appended)
    }

    async fn list_messages(&self, lead_id: &str) -> Result<Vec<LeadMessage>, StoreError> {
        self.check_online()?;
        let g = self.inner.read().await;
        Ok(g.messages.get(lead_id).cloned().unwrap_or_default())
    }

    async fn stage_pending_lead(&self, pending: PendingLead) -> Result<StageOutcome, StoreError> {
        self.check_online()?;
        let mut g = self.inner.write().await;
        if let Some(existing) = g.pending_leads.iter().find(|p| {
            p.is_active() && p.agency_id == pending.agency_id && p.phone == pending.phone
        }) {
            return Ok(StageOutcome::AlreadyPending(existing.id.clone()));
        }
        let id = pending.id.clone();
        g.pending_leads.push(pending);
        self.save(&g).await?;
        Ok(StageOutcome::Created(id))
    }

    async fn get_pending_lead(&self, id: &str) -> Result<Option<PendingLead>, StoreError> {
        self.check_online()?;
        let g = self.inner.read().await;
        Ok(g.pending_leads.iter().find(|p| p.id == id).cloned())
    }

    async fn list_pending_leads(&self, agency_id: &str) -> Result<Vec<PendingLead>, StoreError> {
        self.check_online()?;
        let g = self.inner.read().await;
        Ok(g.pending_leads
            .iter()
            .filter(|p| p.agency_id == agency_id)
            .cloned()
            .collect())
    }

    async fn delete_pending_lead(&self, id: &str) -> Result<bool, StoreError> {
        self.check_online()?;
        let mut g = self.inner.write().await;
        let before = g.pending_leads.len();
        g.pending_leads.retain(|p| p.id != id);
        if g.pending_leads.len() == before {
            return Ok(false);
        }
        self.save(&g).await?;
        Ok(true)
    }

    async fn purge_expired_pending(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        self.check_online()?;
        let mut g = self.inner.write().await;
        let before = g.pending_leads.len();
        g.pending_leads.retain(|p| !p.is_expired(now));
        let removed = before - g.pending_leads.len();
        if removed > 0 {
            self.save(&g).await?;
        }
        Ok(removed)
    }

    async fn insert_draft_property(
        &self,
        draft: DraftProperty,
    ) -> Result<DraftOutcome, StoreError> {
        self.check_online()?;
        let mut g = self.inner.write().await;
        if let Some(ext) = draft.external_message_id.as_deref() {
            if let Some(existing) = g.draft_properties.iter().find(|d| {
                d.agency_id == draft.agency_id && d.external_message_id.as_deref() == Some(ext)
            }) {
                return Ok(DraftOutcome::AlreadyDrafted(existing.id.clone()));
            }
        }
        let id = draft.id.clone();
        g.draft_properties.push(draft);
        self.save(&g).await?;
        Ok(DraftOutcome::Created(id))
    }

    async fn list_draft_properties(
        &self,
        agency_id: &str,
    ) -> Result<Vec<DraftProperty>, StoreError> {
        self.check_online()?;
        let g = self.inner.read().await;
        Ok(g.draft_properties
            .iter()
            .filter(|d| d.agency_id == agency_id)
            .cloned()
            .collect())
    }

    async fn insert_alert(&self, alert: Alert) -> Result<(), StoreError> {
        self.check_online()?;
        let mut g = self.inner.write().await;
        g.alerts.push(alert);
        self.save(&g).await
    }

    async fn list_alerts(&self, agency_id: &str) -> Result<Vec<Alert>, StoreError> {
        self.check_online()?;
        let g = self.inner.read().await;
        Ok(g.alerts
            .iter()
            .filter(|a| a.agency_id == agency_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Intent, LeadKind, LeadStatus, NewPendingLead};
    use chrono::Duration;

    fn lead(id: &str, agency: &str, phone: &str) -> Lead {
        Lead {
            id: id.into(),
            agency_id: agency.into(),
            name: "Test".into(),
            phone: phone.into(),
            kind: LeadKind::Buyer,
            status: LeadStatus::New,
            source: "whatsapp".into(),
            created_at: Utc::now(),
            last_message_at: None,
            unread_count: 0,
        }
    }

    fn pending(agency: &str, phone: &str) -> PendingLead {
        NewPendingLead {
            agency_id: agency.into(),
            phone: phone.into(),
            initial_message: "hello".into(),
            initial_message_id: None,
            ai_summary: "summary".into(),
            ai_intent: Intent::Inquiry,
        }
        .into_pending(Utc::now(), Duration::days(14))
    }

    #[tokio::test]
    async fn find_lead_is_scoped_by_agency() {
        let store = MemoryStore::new();
        store.insert_lead(lead("l1", "a", "0501234567")).await.unwrap();
        assert!(store.find_lead_by_phone("a", "0501234567", "972").await.unwrap().is_some());
        assert!(store.find_lead_by_phone("b", "0501234567", "972").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stored_phone_is_normalized_before_comparing() {
        let store = MemoryStore::new();
        store.insert_lead(lead("l1", "a", "+972-50-123-4567")).await.unwrap();
        store.insert_lead(lead("l2", "a", "972529876543")).await.unwrap();
        let found = store.find_lead_by_phone("a", "0501234567", "972").await.unwrap();
        assert_eq!(found.map(|l| l.id).as_deref(), Some("l1"));
        let found = store.find_lead_by_phone("a", "0529876543", "972").await.unwrap();
        assert_eq!(found.map(|l| l.id).as_deref(), Some("l2"));
    }

    #[tokio::test]
    async fn append_rejects_repeated_external_id_and_bumps_unread() {
        let store = MemoryStore::new();
        store.insert_lead(lead("l1", "a", "0501234567")).await.unwrap();
        let now = Utc::now();
        let m = LeadMessage::inbound("hi", "0501234567", Some("ABC".into()), now);
        assert_eq!(store.append_message("l1", m.clone()).await.unwrap(), AppendOutcome::Appended);
        assert_eq!(store.append_message("l1", m).await.unwrap(), AppendOutcome::Duplicate);
        assert!(store.message_exists("l1", "ABC").await.unwrap());
        assert!(!store.message_exists("l1", "XYZ").await.unwrap());
        let l = store.get_lead("l1").await.unwrap().unwrap();
        assert_eq!(l.unread_count, 1);
        assert_eq!(l.last_message_at, Some(now));
    }

    #[tokio::test]
    async fn append_without_external_id_never_dedups() {
        let store = MemoryStore::new();
        store.insert_lead(lead("l1", "a", "0501234567")).await.unwrap();
        let m = LeadMessage::inbound("hi", "0501234567", None, Utc::now());
        store.append_message("l1", m.clone()).await.unwrap();
        store.append_message("l1", m).await.unwrap();
        assert_eq!(store.list_messages("l1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn append_to_missing_lead_fails() {
        let store = MemoryStore::new();
        let m = LeadMessage::inbound("hi", "050", None, Utc::now());
        assert!(matches!(
            store.append_message("nope", m).await,
            Err(StoreError::LeadNotFound(_))
        ));
    }

    #[tokio::test]
    async fn stage_is_check_and_insert() {
        let store = MemoryStore::new();
        let id = match store.stage_pending_lead(pending("a", "050")).await.unwrap() {
            StageOutcome::Created(id) => id,
            other => panic!("expected Created, got {:?}", other),
        };
        assert_eq!(
            store.stage_pending_lead(pending("a", "050")).await.unwrap(),
            StageOutcome::AlreadyPending(id)
        );
        assert!(matches!(
            store.stage_pending_lead(pending("b", "050")).await.unwrap(),
            StageOutcome::Created(_)
        ));
        assert_eq!(store.list_pending_leads("a").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_staging_creates_one() {
        let store = MemoryStore::new();
        let mut handles = Vec::new();
        for _ in 0..16 {
            let s = store.clone();
            handles.push(tokio::spawn(async move {
                s.stage_pending_lead(pending("a", "050")).await.unwrap()
            }));
        }
        let mut created = 0;
        for h in handles {
            if matches!(h.await.unwrap(), StageOutcome::Created(_)) {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(store.list_pending_leads("a").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn purge_removes_only_expired() {
        let store = MemoryStore::new();
        let mut old = pending("a", "050");
        old.expires_at = Utc::now() - Duration::days(1);
        store.stage_pending_lead(old).await.unwrap();
        store.stage_pending_lead(pending("a", "051")).await.unwrap();
        assert_eq!(store.purge_expired_pending(Utc::now()).await.unwrap(), 1);
        let left = store.list_pending_leads("a").await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].phone, "051");
    }

    #[tokio::test]
    async fn offline_store_fails_every_call() {
        let store = MemoryStore::new();
        store.set_offline(true);
        assert!(matches!(
            store.list_alerts("a").await,
            Err(StoreError::Unavailable(_))
        ));
        store.set_offline(false);
        assert!(store.list_alerts("a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn snapshot_round_trips_through_file() {
        let path = std::env::temp_dir()
            .join(format!("realty-store-test-{}", uuid::Uuid::new_v4()))
            .join("store.json");
        let store = MemoryStore::load(&path).await.unwrap();
        store.insert_lead(lead("l1", "a", "0501234567")).await.unwrap();
        store.stage_pending_lead(pending("a", "052")).await.unwrap();

        let reloaded = MemoryStore::load(&path).await.unwrap();
        assert_eq!(reloaded.list_leads("a").await.unwrap().len(), 1);
        assert_eq!(reloaded.list_pending_leads("a").await.unwrap().len(), 1);
        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }
}
