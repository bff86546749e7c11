//! HTTP wire types for the webhook and the admin endpoints.

use crate::model::LeadKind;
use serde::{Deserialize, Serialize};

/// The only body the webhook ever answers with: `{ "success": true }`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WebhookAck {
    pub success: bool,
}

impl WebhookAck {
    pub const OK: WebhookAck = WebhookAck { success: true };
}

/// `GET /` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    pub runtime: String,
    pub port: u16,
}

/// `POST /pending-leads/:id/approve` body: `{ "name", "type" }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApproveRequest {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: LeadKind,
}

/// `POST /pending-leads/:id/reject` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectResponse {
    pub deleted: bool,
}

/// Admin error body: `{ "error": "..." }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
