//! Inbound message from a gateway, normalized across flavors, and its classification.

use crate::config::WebhookConfig;
use crate::phone::{DIRECT_CHAT_SUFFIX, GROUP_CHAT_SUFFIX};
use crate::tenants::TenantKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayFlavor {
    GreenApi,
    Waha,
}

impl GatewayFlavor {
    pub fn as_str(self) -> &'static str {
        match self {
            GatewayFlavor::GreenApi => "green-api",
            GatewayFlavor::Waha => "waha",
        }
    }
}

/// A message from a WhatsApp gateway, ready for routing.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub flavor: GatewayFlavor,
    pub event_type: String,
    pub tenant: Option<TenantKey>,
    pub chat_id: String,
    /// Sender chat id (group member for group chats).
    pub sender: String,
    pub text: String,
    pub external_message_id: Option<String>,
    /// Provider timestamp (Unix seconds).
    pub timestamp: Option<i64>,
    pub from_me: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatCategory {
    Group,
    Direct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// `None` when the chat id carries an unrecognized suffix.
    pub category: Option<ChatCategory>,
    pub is_inbound: bool,
}

/// Chat category from the chat-id suffix.
pub fn chat_category(chat_id: &str) -> Option<ChatCategory> {
    let id = chat_id.trim();
    if id.ends_with(GROUP_CHAT_SUFFIX) {
        Some(ChatCategory::Group)
    } else if id.ends_with(DIRECT_CHAT_SUFFIX) {
        Some(ChatCategory::Direct)
    } else {
        None
    }
}

/// Group vs. direct, and whether the event type is this flavor's inbound-message type.
pub fn classify(event: &InboundEvent, webhook: &WebhookConfig) -> Classification {
    let expected = match event.flavor {
        GatewayFlavor::GreenApi => webhook.green_api_event_type.as_str(),
        GatewayFlavor::Waha => webhook.waha_event_type.as_str(),
    };
    Classification {
        category: chat_category(&event.chat_id),
        is_inbound: !event.from_me && event.event_type == expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(flavor: GatewayFlavor, event_type: &str, chat_id: &str) -> InboundEvent {
        InboundEvent {
            flavor,
            event_type: event_type.to_string(),
            tenant: None,
            chat_id: chat_id.to_string(),
            sender: chat_id.to_string(),
            text: "hi".to_string(),
            external_message_id: None,
            timestamp: None,
            from_me: false,
        }
    }

    #[test]
    fn suffix_decides_category() {
        assert_eq!(chat_category("120363000000@g.us"), Some(ChatCategory::Group));
        assert_eq!(chat_category("972501234567@c.us"), Some(ChatCategory::Direct));
        assert_eq!(chat_category("status@broadcast"), None);
        assert_eq!(chat_category(""), None);
    }

    #[test]
    fn event_type_must_match_flavor() {
        let cfg = WebhookConfig::default();
        let green = event(GatewayFlavor::GreenApi, "incomingMessageReceived", "972501234567@c.us");
        assert!(classify(&green, &cfg).is_inbound);
        let status = event(GatewayFlavor::GreenApi, "outgoingMessageStatus", "972501234567@c.us");
        assert!(!classify(&status, &cfg).is_inbound);
        let cross = event(GatewayFlavor::Waha, "incomingMessageReceived", "972501234567@c.us");
        assert!(!classify(&cross, &cfg).is_inbound);
        let waha = event(GatewayFlavor::Waha, "message", "120363000000@g.us");
        assert_eq!(
            classify(&waha, &cfg),
            Classification {
                category: Some(ChatCategory::Group),
                is_inbound: true
            }
        );
    }

    #[test]
    fn own_messages_are_not_inbound() {
        let mut e = event(GatewayFlavor::Waha, "message", "972501234567@c.us");
        e.from_me = true;
        assert!(!classify(&e, &WebhookConfig::default()).is_inbound);
    }
}
