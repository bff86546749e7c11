//! WhatsApp gateway webhook payloads (Green API and WAHA) and their normalization.
//!
//! The flavor is decided once from the body shape; everything downstream sees [`InboundEvent`].

use crate::channels::inbound::{GatewayFlavor, InboundEvent};
use crate::tenants::TenantKey;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("body is not a JSON object")]
    NotAnObject,
    #[error("unrecognized gateway payload")]
    UnknownFlavor,
}

/// One webhook call, tagged by gateway flavor.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    GreenApi(GreenApiEvent),
    Waha(WahaEvent),
}

/// Green API notification (subset consumed by the router).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GreenApiEvent {
    #[serde(default, alias = "eventType")]
    pub type_webhook: Option<String>,
    /// Number in real payloads; accepted as string too.
    #[serde(default, alias = "gatewayInstanceId")]
    pub id_instance: Option<Value>,
    #[serde(default)]
    pub instance_data: Option<GreenApiInstanceData>,
    /// Session name, used for the tenant lookup when no instance id is present.
    #[serde(default, alias = "sessionName")]
    pub session: Option<String>,
    #[serde(default)]
    pub sender_data: Option<GreenApiSenderData>,
    #[serde(default)]
    pub message_data: Option<GreenApiMessageData>,
    #[serde(default)]
    pub id_message: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GreenApiInstanceData {
    #[serde(default)]
    pub id_instance: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GreenApiSenderData {
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub sender_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GreenApiMessageData {
    #[serde(default)]
    pub type_message: Option<String>,
    #[serde(default)]
    pub text_message_data: Option<GreenApiTextMessage>,
    #[serde(default)]
    pub extended_text_message_data: Option<GreenApiExtendedText>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GreenApiTextMessage {
    #[serde(default)]
    pub text_message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GreenApiExtendedText {
    #[serde(default)]
    pub text: Option<String>,
}

/// WAHA webhook (`{ event, session, payload }`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WahaEvent {
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub session: Option<String>,
    #[serde(default)]
    pub payload: Option<WahaMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WahaMessage {
    #[serde(default)]
    pub id: Option<String>,
    /// Chat id: the sender for direct chats, the group for group chats.
    #[serde(default)]
    pub from: Option<String>,
    /// Group member who sent the message.
    #[serde(default)]
    pub participant: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

fn id_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn session_key(session: Option<&str>) -> Option<TenantKey> {
    session
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| TenantKey::Session(s.to_string()))
}

impl GatewayEvent {
    /// Decode a webhook body. Green API is recognized by `typeWebhook`/`eventType`/`idInstance`/`instanceData`,
    /// WAHA by `event` together with `session` or `payload`.
    pub fn from_slice(body: &[u8]) -> Result<Self, ParseError> {
        let value: Value = serde_json::from_slice(body)?;
        let obj = value.as_object().ok_or(ParseError::NotAnObject)?;
        let is_green = ["typeWebhook", "eventType", "idInstance", "gatewayInstanceId", "instanceData"]
            .iter()
            .any(|k| obj.contains_key(*k));
        let is_waha = obj.contains_key("event")
            && (obj.contains_key("session") || obj.contains_key("payload"));
        if is_green {
            Ok(GatewayEvent::GreenApi(serde_json::from_value(value)?))
        } else if is_waha {
            Ok(GatewayEvent::Waha(serde_json::from_value(value)?))
        } else {
            Err(ParseError::UnknownFlavor)
        }
    }

    pub fn flavor(&self) -> GatewayFlavor {
        match self {
            GatewayEvent::GreenApi(_) => GatewayFlavor::GreenApi,
            GatewayEvent::Waha(_) => GatewayFlavor::Waha,
        }
    }

    pub fn tenant_key(&self) -> Option<TenantKey> {
        match self {
            GatewayEvent::GreenApi(e) => e
                .id_instance
                .as_ref()
                .and_then(id_to_string)
                .or_else(|| {
                    e.instance_data
                        .as_ref()
                        .and_then(|d| d.id_instance.as_ref())
                        .and_then(id_to_string)
                })
                .map(TenantKey::Instance)
                .or_else(|| session_key(e.session.as_deref())),
            GatewayEvent::Waha(e) => session_key(e.session.as_deref()),
        }
    }

    /// Flatten into the flavor-independent event. Missing fields become empty strings; the router rejects them.
    pub fn into_inbound(self) -> InboundEvent {
        let flavor = self.flavor();
        let tenant = self.tenant_key();
        match self {
            GatewayEvent::GreenApi(e) => {
                let sender = e.sender_data.unwrap_or_default();
                let text = e
                    .message_data
                    .and_then(|m| {
                        m.text_message_data
                            .and_then(|t| t.text_message)
                            .or_else(|| m.extended_text_message_data.and_then(|t| t.text))
                    })
                    .unwrap_or_default();
                let chat_id = sender.chat_id.unwrap_or_default();
                InboundEvent {
                    flavor,
                    event_type: e.type_webhook.unwrap_or_default(),
                    tenant,
                    sender: sender.sender.unwrap_or_else(|| chat_id.clone()),
                    chat_id,
                    text,
                    external_message_id: e.id_message.filter(|s| !s.trim().is_empty()),
                    timestamp: e.timestamp,
                    from_me: false,
                }
            }
            GatewayEvent::Waha(e) => {
                let msg = e.payload.unwrap_or_default();
                let chat_id = msg.from.unwrap_or_default();
                InboundEvent {
                    flavor,
                    event_type: e.event.unwrap_or_default(),
                    tenant,
                    sender: msg.participant.unwrap_or_else(|| chat_id.clone()),
                    chat_id,
                    text: msg.body.unwrap_or_default(),
                    external_message_id: msg.id.filter(|s| !s.trim().is_empty()),
                    timestamp: msg.timestamp,
                    from_me: msg.from_me,
                }
            }
        }
    }
}
