//! Gateway: HTTP server for the WhatsApp webhook and the admin API.
//!
//! Single port. `POST /webhook` always answers `{"success": true}` before any processing;
//! the admin endpoints behave like a normal JSON API with bearer-token auth.

pub mod auth;
mod protocol;
mod server;

pub use protocol::{ApproveRequest, ErrorBody, Health, RejectResponse, WebhookAck};
pub use server::{build_app, run_gateway, ApiError, GatewayState};
