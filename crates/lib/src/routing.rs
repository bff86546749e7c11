//! Inbound message routing: one webhook delivery in, one terminal outcome out.
//!
//! A delivery is validated (shared secret, body, event type), attributed to an agency, then
//! classified by chat id. Group messages go to the listing drafter. Direct messages either land
//! on an existing lead's history (after the duplicate check) or go through triage and staging.
//! Processing never returns an error: every failure becomes a logged [`RouteOutcome`].

use crate::channels::{classify, ChatCategory, GatewayEvent, InboundEvent};
use crate::config::{self, Config, WebhookConfig};
use crate::gateway::auth::secrets_match;
use crate::leads;
use crate::listing::ListingDrafter;
use crate::llm;
use crate::model::{AgencyId, LeadMessage, NewPendingLead};
use crate::phone;
use crate::staging::Staging;
use crate::store::{AppendOutcome, DraftOutcome, StageOutcome, Store, StoreError};
use crate::tenants::TenantResolver;
use crate::triage::Triage;
use chrono::{DateTime, TimeZone, Utc};
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// One webhook call as received, before any validation.
#[derive(Debug, Clone)]
pub struct WebhookDelivery {
    pub correlation_id: String,
    /// Value of the configured secret header, if the gateway sent one.
    pub secret: Option<String>,
    pub body: Vec<u8>,
}

impl WebhookDelivery {
    pub fn new(secret: Option<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            correlation_id: uuid::Uuid::new_v4().to_string(),
            secret,
            body: body.into(),
        }
    }
}

/// Terminal state of one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Unauthorized,
    Malformed(String),
    Ignored(String),
    TenantNotFound,
    ListingDrafted { draft_id: String },
    ListingAlreadyDrafted { draft_id: String },
    NotAListing,
    Duplicate { lead_id: String },
    MessageAppended { lead_id: String },
    NotALead,
    Staged { pending_id: String },
    AlreadyPending { pending_id: String },
    Failed(String),
}

impl RouteOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RouteOutcome::Unauthorized => "unauthorized",
            RouteOutcome::Malformed(_) => "malformed",
            RouteOutcome::Ignored(_) => "ignored",
            RouteOutcome::TenantNotFound => "tenant_not_found",
            RouteOutcome::ListingDrafted { .. } => "listing_drafted",
            RouteOutcome::ListingAlreadyDrafted { .. } => "listing_already_drafted",
            RouteOutcome::NotAListing => "not_a_listing",
            RouteOutcome::Duplicate { .. } => "duplicate",
            RouteOutcome::MessageAppended { .. } => "message_appended",
            RouteOutcome::NotALead => "not_a_lead",
            RouteOutcome::Staged { .. } => "staged",
            RouteOutcome::AlreadyPending { .. } => "already_pending",
            RouteOutcome::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("tenant lookup failed: {0}")]
    Tenant(#[source] StoreError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Everything one delivery needs; cheap to clone into a spawned task.
#[derive(Clone)]
pub struct MessageRouter {
    store: Arc<dyn Store>,
    tenants: Arc<dyn TenantResolver>,
    triage: Triage,
    staging: Staging,
    webhook: WebhookConfig,
    secret: Option<String>,
}

impl MessageRouter {
    pub fn new(
        store: Arc<dyn Store>,
        tenants: Arc<dyn TenantResolver>,
        triage: Triage,
        webhook: WebhookConfig,
        staging_ttl_days: i64,
    ) -> Self {
        let secret = webhook
            .secret
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        Self {
            staging: Staging::new(store.clone(), staging_ttl_days)
                .with_country_code(webhook.country_code.clone()),
            store,
            tenants,
            triage,
            webhook,
            secret,
        }
    }

    /// Router wired from config: webhook secret (env wins), triage backend and staging TTL.
    pub fn from_config(
        config: &Config,
        store: Arc<dyn Store>,
        tenants: Arc<dyn TenantResolver>,
    ) -> Self {
        let triage = Triage::new(
            llm::generator_from_config(config),
            Duration::from_secs(config.triage.timeout_secs.max(1)),
        );
        Self::new(
            store,
            tenants,
            triage,
            config.webhook.clone(),
            config.staging.ttl_days,
        )
        .with_secret(config::resolve_webhook_secret(config))
    }

    pub fn with_secret(mut self, secret: Option<String>) -> Self {
        self.secret = secret.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn secret_header(&self) -> &str {
        &self.webhook.secret_header
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn staging(&self) -> &Staging {
        &self.staging
    }

    /// Run `process` on its own task. A panic inside processing is caught and reported as `Failed`.
    pub fn dispatch(&self, delivery: WebhookDelivery) -> JoinHandle<RouteOutcome> {
        let router = self.clone();
        tokio::spawn(async move {
            let evt = delivery.correlation_id.clone();
            match AssertUnwindSafe(router.process(delivery)).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(_) => {
                    log::error!("evt={} processing panicked; event dropped", evt);
                    RouteOutcome::Failed("panic".to_string())
                }
            }
        })
    }

    /// Route one delivery to its terminal outcome. Never fails.
    pub async fn process(&self, delivery: WebhookDelivery) -> RouteOutcome {
        let evt = delivery.correlation_id.as_str();
        match self.route(&delivery).await {
            Ok(outcome) => {
                log::debug!("evt={} done: {}", evt, outcome.label());
                outcome
            }
            Err(e) => {
                log::error!("evt={} processing aborted: {}", evt, e);
                RouteOutcome::Failed(e.to_string())
            }
        }
    }

    async fn route(&self, delivery: &WebhookDelivery) -> Result<RouteOutcome, RouteError> {
        let evt = delivery.correlation_id.as_str();

        if let Some(expected) = self.secret.as_deref() {
            if !secrets_match(delivery.secret.as_deref(), expected) {
                log::warn!("evt={} webhook secret mismatch; dropped", evt);
                return Ok(RouteOutcome::Unauthorized);
            }
        }

        let event = match GatewayEvent::from_slice(&delivery.body) {
            Ok(e) => e.into_inbound(),
            Err(e) => {
                log::info!("evt={} unreadable body: {}", evt, e);
                return Ok(RouteOutcome::Malformed(e.to_string()));
            }
        };

        let class = classify(&event, &self.webhook);
        if !class.is_inbound {
            log::info!(
                "evt={} ignoring {} event type {:?} (from_me={})",
                evt,
                event.flavor.as_str(),
                event.event_type,
                event.from_me
            );
            return Ok(RouteOutcome::Ignored(format!("event type {}", event.event_type)));
        }
        if event.sender.trim().is_empty() || event.text.trim().is_empty() {
            log::info!("evt={} missing sender or text; dropped", evt);
            return Ok(RouteOutcome::Malformed("missing sender or text".to_string()));
        }

        let agency_id = match event.tenant.as_ref() {
            Some(key) => self
                .tenants
                .resolve_key(key)
                .await
                .map_err(RouteError::Tenant)?,
            None => None,
        };
        let Some(agency_id) = agency_id else {
            log::info!("evt={} no tenant for {:?}; dropped", evt, event.tenant);
            return Ok(RouteOutcome::TenantNotFound);
        };

        match class.category {
            Some(ChatCategory::Group) => self.route_group(evt, &agency_id, event).await,
            Some(ChatCategory::Direct) => self.route_direct(evt, &agency_id, event).await,
            None => {
                log::info!(
                    "evt={} agency={} unrecognized chat id {:?}; dropped",
                    evt,
                    agency_id,
                    event.chat_id
                );
                Ok(RouteOutcome::Ignored(format!("chat id {}", event.chat_id)))
            }
        }
    }

    async fn route_group(
        &self,
        evt: &str,
        agency_id: &AgencyId,
        event: InboundEvent,
    ) -> Result<RouteOutcome, RouteError> {
        let drafter = ListingDrafter::new(self.store.as_ref(), &self.webhook.country_code);
        let drafted = drafter
            .draft_if_listing(
                agency_id,
                &event.chat_id,
                &event.sender,
                &event.text,
                event.external_message_id,
            )
            .await?;
        Ok(match drafted {
            Some(DraftOutcome::Created(draft_id)) => {
                log::info!(
                    "evt={} agency={} group {} listing drafted as {}",
                    evt,
                    agency_id,
                    event.chat_id,
                    draft_id
                );
                RouteOutcome::ListingDrafted { draft_id }
            }
            Some(DraftOutcome::AlreadyDrafted(draft_id)) => {
                log::info!(
                    "evt={} agency={} group {} listing already drafted as {}; skipped",
                    evt,
                    agency_id,
                    event.chat_id,
                    draft_id
                );
                RouteOutcome::ListingAlreadyDrafted { draft_id }
            }
            None => {
                log::debug!("evt={} agency={} group message is not a listing", evt, agency_id);
                RouteOutcome::NotAListing
            }
        })
    }

    async fn route_direct(
        &self,
        evt: &str,
        agency_id: &AgencyId,
        event: InboundEvent,
    ) -> Result<RouteOutcome, RouteError> {
        let cc = self.webhook.country_code.as_str();
        let phone = phone::normalize_with(&event.sender, cc);
        if phone.is_empty() {
            log::info!("evt={} agency={} sender {:?} has no digits; dropped", evt, agency_id, event.sender);
            return Ok(RouteOutcome::Malformed("sender has no phone number".to_string()));
        }

        if let Some(lead) =
            leads::find_lead_by_phone(self.store.as_ref(), agency_id, &event.sender, cc).await?
        {
            let ext_id = event.external_message_id.as_deref();
            if leads::is_duplicate(self.store.as_ref(), &lead.id, ext_id).await? {
                log::info!(
                    "evt={} agency={} duplicate message {:?} for lead {}; skipped",
                    evt,
                    agency_id,
                    ext_id,
                    lead.id
                );
                return Ok(RouteOutcome::Duplicate { lead_id: lead.id });
            }
            let message = LeadMessage::inbound(
                event.text,
                phone,
                event.external_message_id,
                event_time(event.timestamp),
            );
            let appended = self.store.append_message(&lead.id, message).await?;
            return Ok(match appended {
                AppendOutcome::Appended => {
                    log::info!("evt={} agency={} message appended to lead {}", evt, agency_id, lead.id);
                    RouteOutcome::MessageAppended { lead_id: lead.id }
                }
                AppendOutcome::Duplicate => {
                    log::info!(
                        "evt={} agency={} concurrent duplicate for lead {}; skipped",
                        evt,
                        agency_id,
                        lead.id
                    );
                    RouteOutcome::Duplicate { lead_id: lead.id }
                }
            });
        }

        let verdict = self.triage.triage(&event.text).await;
        if !verdict.is_lead {
            log::info!(
                "evt={} agency={} unknown sender {} is not a lead ({:?})",
                evt,
                agency_id,
                phone,
                verdict.source
            );
            return Ok(RouteOutcome::NotALead);
        }

        let candidate = NewPendingLead {
            agency_id: agency_id.clone(),
            phone: phone.clone(),
            initial_message: event.text,
            initial_message_id: event.external_message_id,
            ai_summary: verdict.summary,
            ai_intent: verdict.intent,
        };
        Ok(match self.staging.stage(candidate).await? {
            StageOutcome::Created(pending_id) => {
                log::info!(
                    "evt={} agency={} staged pending lead {} for {} (intent={})",
                    evt,
                    agency_id,
                    pending_id,
                    phone,
                    verdict.intent.as_str()
                );
                RouteOutcome::Staged { pending_id }
            }
            StageOutcome::AlreadyPending(pending_id) => {
                log::info!(
                    "evt={} agency={} {} already pending as {}",
                    evt,
                    agency_id,
                    phone,
                    pending_id
                );
                RouteOutcome::AlreadyPending { pending_id }
            }
        })
    }
}

fn event_time(timestamp: Option<i64>) -> DateTime<Utc> {
    timestamp
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .unwrap_or_else(Utc::now)
}
