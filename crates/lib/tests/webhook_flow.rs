//! Integration test: real HTTP server on a free port, webhook deliveries and admin calls over reqwest.
//! Triage runs on keywords only, so no network backend is needed.

use chrono::Utc;
use realty::config::{Config, GatewayAuthMode, TenantConfig};
use realty::gateway::{build_app, GatewayState};
use realty::model::{Lead, LeadKind, LeadStatus};
use realty::routing::MessageRouter;
use realty::store::{MemoryStore, Store};
use realty::tenants::ConfigTenants;
use realty::triage::Triage;
use serde_json::{json, Value};
use std::sync::Arc;

const AGENCY: &str = "agency-x";
const SECRET: &str = "hook-secret";
const ADMIN_TOKEN: &str = "admin-token";
const INQUIRY: &str = "מעוניין בדירה 3 חדרים, מה המחיר?";

struct TestGateway {
    base: String,
    store: MemoryStore,
    state: GatewayState,
    client: reqwest::Client,
}

impl TestGateway {
    async fn start() -> Self {
        let mut config = Config::default();
        config.gateway.auth.mode = GatewayAuthMode::Token;
        config.gateway.auth.token = Some(ADMIN_TOKEN.to_string());
        config.webhook.secret = Some(SECRET.to_string());
        config.tenants = vec![TenantConfig {
            agency_id: AGENCY.to_string(),
            gateway_instance_id: Some("1101000001".to_string()),
            session_name: None,
        }];

        let store = MemoryStore::new();
        let router = MessageRouter::new(
            Arc::new(store.clone()),
            Arc::new(ConfigTenants::new(config.tenants.clone())),
            Triage::keywords_only(),
            config.webhook.clone(),
            config.staging.ttl_days,
        );
        let state = GatewayState::new(&config, router);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind free port");
        let addr = listener.local_addr().expect("local_addr");
        let app = build_app(state.clone());
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            base: format!("http://{}", addr),
            store,
            state,
            client: reqwest::Client::new(),
        }
    }

    async fn deliver(&self, secret: Option<&str>, body: Vec<u8>) -> reqwest::Response {
        let mut req = self
            .client
            .post(format!("{}/webhook", self.base))
            .header("content-type", "application/json")
            .body(body);
        if let Some(s) = secret {
            req = req.header("x-webhook-secret", s);
        }
        req.send().await.expect("POST /webhook")
    }

    /// Deliver with the right secret, assert the fixed ack, then wait for processing to finish.
    async fn deliver_and_settle(&self, body: Vec<u8>) {
        let resp = self.deliver(Some(SECRET), body).await;
        assert_ack(resp).await;
        self.state.drain().await;
    }

    fn admin(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base, path))
            .bearer_auth(ADMIN_TOKEN)
    }
}

async fn assert_ack(resp: reqwest::Response) {
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let body: Value = resp.json().await.expect("ack JSON");
    assert_eq!(body, json!({ "success": true }));
}

fn green(chat_id: &str, text: &str, id_message: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "typeWebhook": "incomingMessageReceived",
        "instanceData": { "idInstance": 1101000001u64, "wid": "972520000000@c.us" },
        "timestamp": 1700000000,
        "idMessage": id_message,
        "senderData": { "chatId": chat_id, "sender": "972501234567@c.us", "senderName": "Dana" },
        "messageData": {
            "typeMessage": "textMessage",
            "textMessageData": { "textMessage": text }
        }
    }))
    .expect("encode body")
}

#[tokio::test]
async fn webhook_always_acks_with_success() {
    let gw = TestGateway::start().await;
    assert_ack(gw.deliver(Some(SECRET), b"{not json".to_vec()).await).await;
    assert_ack(gw.deliver(Some(SECRET), Vec::new()).await).await;
    assert_ack(gw.deliver(Some("wrong"), green("972501234567@c.us", INQUIRY, "A1")).await).await;
    assert_ack(gw.deliver(None, green("972501234567@c.us", INQUIRY, "A2")).await).await;
    gw.state.drain().await;
    // Neither the unreadable bodies nor the unauthenticated ones left anything behind.
    assert!(gw.store.list_pending_leads(AGENCY).await.unwrap().is_empty());
    assert!(gw.store.list_alerts(AGENCY).await.unwrap().is_empty());
}

#[tokio::test]
async fn unknown_sender_inquiry_becomes_one_pending_lead() {
    let gw = TestGateway::start().await;
    gw.deliver_and_settle(green("972501234567@c.us", INQUIRY, "BAE5F4886C5A1")).await;

    let pending = gw.store.list_pending_leads(AGENCY).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].phone, "0501234567");
    assert!(matches!(pending[0].ai_intent.as_str(), "buy" | "inquiry"));
    let alerts = gw.store.list_alerts(AGENCY).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].target_agent_id, "all");
}

// The sender is unknown, so there is no lead history for the message-id check to consult. The
// repeated delivery is absorbed by the one-pending-lead-per-phone rule instead.
#[tokio::test]
async fn repeated_delivery_from_unknown_sender_stages_once() {
    let gw = TestGateway::start().await;
    gw.deliver_and_settle(green("972501234567@c.us", INQUIRY, "SAME")).await;
    gw.deliver_and_settle(green("972501234567@c.us", INQUIRY, "SAME")).await;

    assert_eq!(gw.store.list_pending_leads(AGENCY).await.unwrap().len(), 1);
    assert_eq!(gw.store.list_alerts(AGENCY).await.unwrap().len(), 1);
    assert!(gw.store.list_leads(AGENCY).await.unwrap().is_empty());
}

#[tokio::test]
async fn group_listing_becomes_draft_property() {
    let gw = TestGateway::start().await;
    gw.deliver_and_settle(green(
        "120363000000000000@g.us",
        "דירה למכירה 3 חדרים מחיר 2,000,000",
        "G1",
    ))
    .await;

    let drafts = gw.store.list_draft_properties(AGENCY).await.unwrap();
    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0].status, "draft");
    assert!(gw.store.list_pending_leads(AGENCY).await.unwrap().is_empty());
}

#[tokio::test]
async fn known_sender_message_is_appended_once() {
    let gw = TestGateway::start().await;
    gw.store
        .insert_lead(Lead {
            id: "lead-1".into(),
            agency_id: AGENCY.into(),
            name: "Dana".into(),
            phone: "0501234567".into(),
            kind: LeadKind::Buyer,
            status: LeadStatus::New,
            source: "whatsapp".into(),
            created_at: Utc::now(),
            last_message_at: None,
            unread_count: 0,
        })
        .await
        .unwrap();

    gw.deliver_and_settle(green("972501234567@c.us", "מתי אפשר לראות?", "D1")).await;
    gw.deliver_and_settle(green("972501234567@c.us", "מתי אפשר לראות?", "D1")).await;

    let msgs = gw.store.list_messages("lead-1").await.unwrap();
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0].external_message_id.as_deref(), Some("D1"));
    assert!(gw.store.list_pending_leads(AGENCY).await.unwrap().is_empty());
}

#[tokio::test]
async fn admin_api_lists_approves_and_rejects() {
    let gw = TestGateway::start().await;
    gw.deliver_and_settle(green("972501234567@c.us", INQUIRY, "P1")).await;

    let unauthorized = gw
        .client
        .get(format!("{}/agencies/{}/pending-leads", gw.base, AGENCY))
        .send()
        .await
        .unwrap();
    assert_eq!(unauthorized.status(), reqwest::StatusCode::UNAUTHORIZED);

    let pending: Value = gw
        .admin(reqwest::Method::GET, &format!("/agencies/{}/pending-leads", AGENCY))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let pending_id = pending[0]["id"].as_str().expect("pending id").to_string();

    let alerts: Value = gw
        .admin(reqwest::Method::GET, &format!("/agencies/{}/alerts", AGENCY))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(alerts[0]["type"], "pending_lead");

    let resp = gw
        .admin(reqwest::Method::POST, &format!("/pending-leads/{}/approve", pending_id))
        .json(&json!({ "name": "Dana", "type": "buyer" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let lead: Value = resp.json().await.unwrap();
    assert_eq!(lead["status"], "new");
    assert_eq!(lead["source"], "whatsapp");
    assert_eq!(lead["phone"], "0501234567");
    assert!(gw.store.list_pending_leads(AGENCY).await.unwrap().is_empty());

    let again = gw
        .admin(reqwest::Method::POST, &format!("/pending-leads/{}/approve", pending_id))
        .json(&json!({ "name": "Dana", "type": "buyer" }))
        .send()
        .await
        .unwrap();
    assert_eq!(again.status(), reqwest::StatusCode::NOT_FOUND);
    let err: Value = again.json().await.unwrap();
    assert!(err["error"].as_str().unwrap_or_default().contains(&pending_id));

    let reject = gw
        .admin(reqwest::Method::POST, "/pending-leads/missing/reject")
        .send()
        .await
        .unwrap();
    assert_eq!(reject.status(), reqwest::StatusCode::NOT_FOUND);
}
