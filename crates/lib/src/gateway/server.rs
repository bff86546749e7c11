//! Gateway HTTP server: the gateway webhook plus the admin API, on one port.

use crate::config::{self, Config};
use crate::gateway::auth;
use crate::gateway::protocol::{ApproveRequest, ErrorBody, Health, RejectResponse, WebhookAck};
use crate::model::{Alert, DraftProperty, Lead, PendingLead};
use crate::routing::{MessageRouter, RouteOutcome, WebhookDelivery};
use crate::staging::StagingError;
use crate::store::{MemoryStore, Store, StoreError};
use crate::tenants::ConfigTenants;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct GatewayState {
    port: u16,
    router: MessageRouter,
    /// When set, admin endpoints require `Authorization: Bearer <token>`.
    admin_token: Option<String>,
    /// Processing tasks still running; awaited during graceful shutdown.
    in_flight: Arc<RwLock<Vec<JoinHandle<RouteOutcome>>>>,
}

impl GatewayState {
    pub fn new(config: &Config, router: MessageRouter) -> Self {
        Self {
            port: config.gateway.port,
            router,
            admin_token: require_admin_token(config),
            in_flight: Arc::new(RwLock::new(Vec::new())),
        }
    }

    fn store(&self) -> &Arc<dyn Store> {
        self.router.store()
    }

    async fn track(&self, handle: JoinHandle<RouteOutcome>) {
        let mut g = self.in_flight.write().await;
        g.retain(|h| !h.is_finished());
        g.push(handle);
    }

    /// Wait for every processing task started so far.
    pub async fn drain(&self) {
        let handles = {
            let mut g = self.in_flight.write().await;
            std::mem::take(&mut *g)
        };
        let n = handles.len();
        for h in handles {
            let _ = h.await;
        }
        log::debug!("drained {} in-flight delivery task(s)", n);
    }

    fn authorize(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        match self.admin_token.as_deref() {
            Some(expected) if !auth::secrets_match(auth::bearer_token(headers), expected) => {
                Err(ApiError::Unauthorized)
            }
            _ => Ok(()),
        }
    }
}

fn require_admin_token(config: &Config) -> Option<String> {
    if config.gateway.auth.mode == config::GatewayAuthMode::Token {
        config::resolve_gateway_token(config)
    } else {
        None
    }
}

/// Routes for the webhook, health and admin API.
pub fn build_app(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route("/webhook", post(whatsapp_webhook))
        .route("/agencies/:agency_id/pending-leads", get(list_pending_leads))
        .route("/agencies/:agency_id/draft-properties", get(list_draft_properties))
        .route("/agencies/:agency_id/alerts", get(list_alerts))
        .route("/pending-leads/:id/approve", post(approve_pending_lead))
        .route("/pending-leads/:id/reject", post(reject_pending_lead))
        .with_state(state)
}

/// Run the gateway server; binds to config.gateway.bind:config.gateway.port.
/// When bind is not loopback, admin token auth must be configured or startup fails.
/// Blocks until shutdown (Ctrl+C or SIGTERM), then waits for in-flight deliveries.
pub async fn run_gateway(config: Config) -> Result<()> {
    let bind = config.gateway.bind.trim().to_string();
    if !config::is_loopback_bind(&bind) && require_admin_token(&config).is_none() {
        anyhow::bail!(
            "refusing to bind gateway to {} without auth (set gateway.auth.mode to \"token\" and gateway.auth.token or REALTY_ADMIN_TOKEN)",
            bind
        );
    }

    let store = match config.store.path.as_ref() {
        Some(path) => MemoryStore::load(path)
            .await
            .with_context(|| format!("loading store snapshot {}", path.display()))?,
        None => {
            log::warn!("store.path not set; records are kept in memory only");
            MemoryStore::new()
        }
    };
    let tenants = ConfigTenants::new(config.tenants.clone());
    if tenants.is_empty() {
        log::warn!("no tenants configured; every delivery will be dropped as tenant-not-found");
    }
    let router = MessageRouter::from_config(&config, Arc::new(store), Arc::new(tenants));
    if config::resolve_webhook_secret(&config).is_none() {
        log::warn!("webhook secret not set; deliveries are accepted without a shared secret");
    }
    let state = GatewayState::new(&config, router);
    let app = build_app(state.clone());

    let bind_addr = format!("{}:{}", bind, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Completes on SIGINT or SIGTERM, after in-flight deliveries have finished.
async fn shutdown_signal(state: GatewayState) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining in-flight deliveries");
    state.drain().await;
}

/// POST /webhook: acknowledge first, then process on a separate task. The gateway always gets
/// `200 {"success":true}`, whatever the body or secret.
async fn whatsapp_webhook(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Json<WebhookAck> {
    let secret = auth::header_value(&headers, state.router.secret_header());
    let body = match body {
        Ok(b) => b.to_vec(),
        Err(e) => {
            log::info!("webhook body could not be read: {}", e);
            Vec::new()
        }
    };
    let delivery = WebhookDelivery::new(secret, body);
    log::debug!("evt={} received ({} bytes)", delivery.correlation_id, delivery.body.len());
    let handle = state.router.dispatch(delivery);
    state.track(handle).await;
    Json(WebhookAck::OK)
}

/// GET / returns a simple health JSON.
async fn health_http(State(state): State<GatewayState>) -> Json<Health> {
    Json(Health {
        runtime: "running".to_string(),
        port: state.port,
    })
}

async fn list_pending_leads(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Path(agency_id): Path<String>,
) -> Result<Json<Vec<PendingLead>>, ApiError> {
    state.authorize(&headers)?;
    Ok(Json(state.router.staging().list(&agency_id).await?))
}

async fn list_draft_properties(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Path(agency_id): Path<String>,
) -> Result<Json<Vec<DraftProperty>>, ApiError> {
    state.authorize(&headers)?;
    Ok(Json(state.store().list_draft_properties(&agency_id).await?))
}

async fn list_alerts(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Path(agency_id): Path<String>,
) -> Result<Json<Vec<Alert>>, ApiError> {
    state.authorize(&headers)?;
    Ok(Json(state.store().list_alerts(&agency_id).await?))
}

async fn approve_pending_lead(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<ApproveRequest>,
) -> Result<Json<Lead>, ApiError> {
    state.authorize(&headers)?;
    let lead = state.router.staging().approve(&id, &req.name, req.kind).await?;
    log::info!("pending lead {} approved as lead {} (agency={})", id, lead.id, lead.agency_id);
    Ok(Json(lead))
}

async fn reject_pending_lead(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<RejectResponse>, ApiError> {
    state.authorize(&headers)?;
    if !state.router.staging().reject(&id).await? {
        return Err(ApiError::NotFound(format!("pending lead not found: {}", id)));
    }
    log::info!("pending lead {} rejected", id);
    Ok(Json(RejectResponse { deleted: true }))
}

/// Admin API failure, rendered as `{ "error": ... }`.
#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    NotFound(String),
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        log::error!("admin request failed: {}", e);
        ApiError::Internal(e.to_string())
    }
}

impl From<StagingError> for ApiError {
    fn from(e: StagingError) -> Self {
        match e {
            StagingError::NotFound(_) => ApiError::NotFound(e.to_string()),
            StagingError::Store(e) => e.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayAuthMode;
    use axum::http::HeaderValue;

    fn state(mode: GatewayAuthMode, token: Option<&str>) -> GatewayState {
        let mut config = Config::default();
        config.gateway.auth.mode = mode;
        config.gateway.auth.token = token.map(str::to_string);
        let router = MessageRouter::from_config(
            &config,
            Arc::new(MemoryStore::new()),
            Arc::new(ConfigTenants::default()),
        );
        GatewayState::new(&config, router)
    }

    #[test]
    fn admin_is_open_without_token_mode() {
        let s = state(GatewayAuthMode::None, Some("ignored"));
        assert!(s.authorize(&HeaderMap::new()).is_ok());
    }

    #[test]
    fn admin_requires_bearer_in_token_mode() {
        let s = state(GatewayAuthMode::Token, Some("admin-token"));
        assert!(matches!(s.authorize(&HeaderMap::new()), Err(ApiError::Unauthorized)));

        let mut wrong = HeaderMap::new();
        wrong.insert("authorization", HeaderValue::from_static("Bearer nope"));
        assert!(matches!(s.authorize(&wrong), Err(ApiError::Unauthorized)));

        let mut right = HeaderMap::new();
        right.insert("authorization", HeaderValue::from_static("Bearer admin-token"));
        assert!(s.authorize(&right).is_ok());
    }

    #[test]
    fn staging_errors_map_to_status() {
        let not_found: ApiError = StagingError::NotFound("p1".into()).into();
        assert_eq!(not_found.into_response().status(), StatusCode::NOT_FOUND);
        let store: ApiError = StagingError::Store(StoreError::Unavailable("down".into())).into();
        assert_eq!(store.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn drain_waits_for_tracked_tasks() {
        let s = state(GatewayAuthMode::None, None);
        let handle = s.router.dispatch(WebhookDelivery::new(None, b"{}".to_vec()));
        s.track(handle).await;
        s.drain().await;
        assert!(s.in_flight.read().await.is_empty());
    }
}
