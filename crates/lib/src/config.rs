//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.realty/config.json`) and environment.
//! Secrets (webhook secret, admin token, LLM API key) may come from env so they stay out of the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP server settings (webhook + admin API share one port).
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Inbound webhook settings: shared secret and provider event types.
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// AI triage backend for unknown senders.
    #[serde(default)]
    pub triage: TriageConfig,

    /// Pending-lead staging options.
    #[serde(default)]
    pub staging: StagingConfig,

    /// Persistence options.
    #[serde(default)]
    pub store: StoreConfig,

    /// Tenant records used for reverse lookup by gateway instance or session.
    #[serde(default)]
    pub tenants: Vec<TenantConfig>,
}

/// Server bind, port, and admin auth settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP (default 15151).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,

    /// Admin API auth. When absent, defaults to no auth for loopback bind.
    #[serde(default)]
    pub auth: GatewayAuthConfig,
}

/// Admin API auth: token or none (loopback-only when none).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayAuthConfig {
    /// "none" = no admin token (only safe when bind is loopback). "token" = require `Authorization: Bearer`.
    #[serde(default)]
    pub mode: GatewayAuthMode,

    /// Admin bearer token. Overridden by REALTY_ADMIN_TOKEN env.
    pub token: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayAuthMode {
    /// No auth; allow only when bind is loopback.
    #[default]
    None,

    /// Require a bearer token matching the configured token.
    Token,
}

fn default_gateway_port() -> u16 {
    15151
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
            auth: GatewayAuthConfig::default(),
        }
    }
}

/// Webhook verification and provider event-type settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConfig {
    /// Shared secret the gateway must send in `secret_header`. Overridden by REALTY_WEBHOOK_SECRET env.
    pub secret: Option<String>,
    /// Header carrying the shared secret.
    #[serde(default = "default_secret_header")]
    pub secret_header: String,
    /// Green API event type for inbound messages.
    #[serde(default = "default_green_api_event_type")]
    pub green_api_event_type: String,
    /// WAHA event type for inbound messages.
    #[serde(default = "default_waha_event_type")]
    pub waha_event_type: String,
    /// International dialing prefix rewritten to a leading zero when normalizing phones.
    #[serde(default = "default_country_code")]
    pub country_code: String,
}

fn default_secret_header() -> String {
    "x-webhook-secret".to_string()
}

fn default_green_api_event_type() -> String {
    "incomingMessageReceived".to_string()
}

fn default_waha_event_type() -> String {
    "message".to_string()
}

fn default_country_code() -> String {
    "972".to_string()
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            secret: None,
            secret_header: default_secret_header(),
            green_api_event_type: default_green_api_event_type(),
            waha_event_type: default_waha_event_type(),
            country_code: default_country_code(),
        }
    }
}

/// Which text-generation backend triages unknown senders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriageBackend {
    /// Keyword heuristic only; no network call.
    #[default]
    None,
    /// Local Ollama `/api/chat`.
    Ollama,
    /// Any OpenAI-compatible `/chat/completions` endpoint.
    Openai,
}

/// AI triage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriageConfig {
    #[serde(default)]
    pub backend: TriageBackend,
    /// Backend base URL; each client has its own default.
    pub base_url: Option<String>,
    /// Model id passed as-is to the backend.
    pub model: Option<String>,
    /// Bearer key for the OpenAI-compatible backend. Overridden by REALTY_LLM_API_KEY env.
    pub api_key: Option<String>,
    /// Upper bound for one triage call; on expiry the keyword fallback decides.
    #[serde(default = "default_triage_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_triage_timeout_secs() -> u64 {
    10
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            backend: TriageBackend::None,
            base_url: None,
            model: None,
            api_key: None,
            timeout_secs: default_triage_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagingConfig {
    /// Days until a pending lead's `expiresAt` (advisory; nothing here reaps).
    #[serde(default = "default_ttl_days")]
    pub ttl_days: i64,
}

fn default_ttl_days() -> i64 {
    14
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            ttl_days: default_ttl_days(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// JSON snapshot file. When unset, data lives in memory only.
    pub path: Option<PathBuf>,
}

/// One tenant (agency) and the gateway identifiers that route to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantConfig {
    pub agency_id: String,
    #[serde(default)]
    pub gateway_instance_id: Option<String>,
    #[serde(default)]
    pub session_name: Option<String>,
}

/// Read a non-empty, trimmed env var.
fn env_override(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Resolve the admin token: env REALTY_ADMIN_TOKEN overrides config.
pub fn resolve_gateway_token(config: &Config) -> Option<String> {
    env_override("REALTY_ADMIN_TOKEN").or_else(|| non_empty(config.gateway.auth.token.as_ref()))
}

/// Resolve the webhook shared secret: env REALTY_WEBHOOK_SECRET overrides config.
pub fn resolve_webhook_secret(config: &Config) -> Option<String> {
    env_override("REALTY_WEBHOOK_SECRET").or_else(|| non_empty(config.webhook.secret.as_ref()))
}

/// Resolve the LLM API key: env REALTY_LLM_API_KEY overrides config.
pub fn resolve_llm_api_key(config: &Config) -> Option<String> {
    env_override("REALTY_LLM_API_KEY").or_else(|| non_empty(config.triage.api_key.as_ref()))
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("REALTY_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".realty").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path (or the default). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

/// Write a default config file (and its directory) if none exists yet. Returns true when a file was written.
pub fn init_config(path: &std::path::Path) -> Result<bool> {
    if path.exists() {
        log::debug!("config already exists at {}, skipping", path.display());
        return Ok(false);
    }
    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating config directory {}", dir.display()))?;
    }
    let json = serde_json::to_string_pretty(&Config::default())
        .context("serializing default config")?;
    std::fs::write(path, json)
        .with_context(|| format!("writing default config to {}", path.display()))?;
    log::info!("created default config at {}", path.display());
    Ok(true)
}
