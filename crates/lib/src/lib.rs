//! Realty core library: inbound WhatsApp routing for a multi-tenant real-estate CRM.
//!
//! Gateway webhooks are attributed to an agency, classified as group or direct chat, and turned
//! into draft properties, lead messages or AI-triaged pending leads. Used by the `realty` CLI.

pub mod channels;
pub mod config;
pub mod gateway;
pub mod leads;
pub mod listing;
pub mod llm;
pub mod model;
pub mod phone;
pub mod routing;
pub mod staging;
pub mod store;
pub mod tenants;
pub mod triage;
