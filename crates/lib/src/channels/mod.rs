//! Inbound WhatsApp channel: gateway payload decoding and message classification.
//!
//! Two gateway flavors are supported (Green API, WAHA). Both are normalized into
//! [`InboundEvent`] before any routing decision is made.

mod inbound;
mod whatsapp;

pub use inbound::{
    chat_category, classify, ChatCategory, Classification, GatewayFlavor, InboundEvent,
};
pub use whatsapp::{GatewayEvent, GreenApiEvent, ParseError, WahaEvent};
