//! Startup checks for `run_gateway`: the health endpoint, the fixed webhook ack and the bind guard.
//! The server runs from config alone (no snapshot file, no triage backend) and is aborted at the end.

use realty::config::{Config, GatewayAuthMode, TenantConfig};
use realty::gateway::{self, Health, WebhookAck};
use std::time::Duration;
use tokio::task::JoinHandle;

fn unused_loopback_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|l| l.local_addr())
        .map(|a| a.port())
        .expect("reserve loopback port")
}

fn loopback_config(port: u16) -> Config {
    let mut config = Config::default();
    config.gateway.port = port;
    config.webhook.secret = Some("startup-secret".to_string());
    config.tenants = vec![TenantConfig {
        agency_id: "agency-startup".to_string(),
        gateway_instance_id: Some("7103000001".to_string()),
        session_name: None,
    }];
    config
}

/// Start the gateway and wait until `GET /` answers, returning the parsed health body.
async fn start(config: Config) -> (JoinHandle<()>, Health, String) {
    let base = format!("http://127.0.0.1:{}", config.gateway.port);
    let server = tokio::spawn(async move {
        if let Err(e) = gateway::run_gateway(config).await {
            eprintln!("gateway exited: {:#}", e);
        }
    });
    let client = reqwest::Client::new();
    for _ in 0..100 {
        if let Ok(resp) = client.get(format!("{}/", base)).send().await {
            if resp.status().is_success() {
                let health: Health = resp.json().await.expect("health body");
                return (server, health, base);
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    server.abort();
    panic!("gateway at {} never became healthy", base);
}

#[tokio::test]
async fn health_reports_running_on_configured_port() {
    let port = unused_loopback_port();
    let (server, health, _) = start(loopback_config(port)).await;
    assert_eq!(health.runtime, "running");
    assert_eq!(health.port, port);
    server.abort();
}

#[tokio::test]
async fn webhook_ack_does_not_depend_on_secret_or_body() {
    let port = unused_loopback_port();
    let (server, _, base) = start(loopback_config(port)).await;
    let client = reqwest::Client::new();
    for (secret, body) in [
        (Some("startup-secret"), r#"{"typeWebhook":"incomingMessageReceived","idInstance":7103000001}"#),
        (Some("wrong"), "{}"),
        (None, "<<not json>>"),
    ] {
        let mut req = client.post(format!("{}/webhook", base)).body(body);
        if let Some(s) = secret {
            req = req.header("x-webhook-secret", s);
        }
        let resp = req.send().await.expect("POST /webhook");
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let ack: WebhookAck = resp.json().await.expect("ack body");
        assert!(ack.success);
    }
    server.abort();
}

#[tokio::test]
async fn public_bind_needs_admin_token_mode() {
    let mut config = loopback_config(unused_loopback_port());
    config.gateway.bind = "0.0.0.0".to_string();
    config.gateway.auth.token = Some("tok".to_string());
    // A token alone is not enough while auth mode is still `none`.
    let err = gateway::run_gateway(config).await.expect_err("public bind must be refused");
    assert!(err.to_string().contains("refusing to bind gateway to 0.0.0.0"));

    let mut config = loopback_config(unused_loopback_port());
    config.gateway.bind = "0.0.0.0".to_string();
    config.gateway.auth.mode = GatewayAuthMode::Token;
    config.gateway.auth.token = None;
    if std::env::var("REALTY_ADMIN_TOKEN").map_or(true, |t| t.trim().is_empty()) {
        // Token mode with no token configured anywhere.
        assert!(gateway::run_gateway(config).await.is_err());
    }
}
