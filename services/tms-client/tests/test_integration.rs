//! Integration tests against an in-process mock backend
//!
//! Spins up a real axum server on an ephemeral port and drives the resolver
//! and the notification channel over actual HTTP and WebSocket transports.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tms_client::endpoints::DeploymentEnv;
use tms_client::io::ReqwestHttpClient;
use tms_client::{
    ApiConfig, ChannelConfig, ChannelEvent, ConnectionStatus, EndpointResolver,
    NotificationChannel, ReconnectConfig, RequestOptions, TmsError,
};

struct LocalDevEnv;

impl DeploymentEnv for LocalDevEnv {
    fn host_name(&self) -> Option<String> {
        None
    }
    fn production_mode(&self) -> bool {
        false
    }
    fn deployed_override(&self) -> Option<String> {
        None
    }
    fn local_override(&self) -> Option<String> {
        None
    }
}

fn notification_json() -> serde_json::Value {
    json!({
        "type": "notification",
        "ticket_id": "TMS-1042",
        "subject": "Phishing report",
        "priority": "high",
        "status": "open",
        "message": "New abuse complaint received",
        "timestamp": "2025-06-01T12:00:00Z"
    })
}

async fn tickets_handler() -> impl IntoResponse {
    Json(json!([
        {"ticket_id": "TMS-1", "subject": "Phishing", "status": "open",
         "priority": "high", "received_at": "2025-06-01T09:15:00Z"}
    ]))
}

async fn ws_feed_handler(ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(|mut socket: WebSocket| async move {
        if socket
            .send(Message::Text(notification_json().to_string().into()))
            .await
            .is_err()
        {
            return;
        }

        while let Some(Ok(message)) = socket.recv().await {
            match message {
                Message::Text(text) => {
                    let frame: serde_json::Value = match serde_json::from_str(text.as_str()) {
                        Ok(v) => v,
                        Err(_) => continue,
                    };
                    if frame["type"] == "ping" {
                        let pong = json!({"type": "pong"}).to_string();
                        if socket.send(Message::Text(pong.into())).await.is_err() {
                            break;
                        }
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    })
}

/// Feed that pushes one notification and immediately closes
async fn ws_once_handler(ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(|mut socket: WebSocket| async move {
        let _ = socket
            .send(Message::Text(notification_json().to_string().into()))
            .await;
        let _ = socket.send(Message::Close(None)).await;
    })
}

/// Bind the mock backend on an ephemeral port and serve it in the background
async fn start_backend() -> SocketAddr {
    let app = Router::new()
        .route("/api/tickets", get(tickets_handler))
        .route("/ws/notifications/", get(ws_feed_handler))
        .route("/ws/once/", get(ws_once_handler));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _server = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn resolver_for(addr: SocketAddr, local_url: &str) -> EndpointResolver {
    EndpointResolver::with_parts(
        ApiConfig {
            local_url: local_url.to_string(),
            deployed_url: format!("http://{}", addr),
            request_timeout_seconds: 2,
            ..ApiConfig::default()
        },
        Arc::new(LocalDevEnv),
        Arc::new(ReqwestHttpClient::new()),
    )
}

fn channel_config(addr: SocketAddr, path: &str) -> ChannelConfig {
    ChannelConfig {
        url: format!("ws://{}{}", addr, path),
        heartbeat_interval_seconds: 1,
        connection_timeout_seconds: 2,
        reconnect: ReconnectConfig {
            enabled: false,
            ..ReconnectConfig::default()
        },
        ..ChannelConfig::default()
    }
}

const POLL_DEADLINE: Duration = Duration::from_secs(5);
const POLL_STEP: Duration = Duration::from_millis(20);

#[tokio::test]
async fn test_call_falls_back_to_reachable_endpoint() {
    let addr = start_backend().await;
    // First candidate refuses connections, second is the live backend
    let resolver = resolver_for(addr, "http://127.0.0.1:1");

    let value = resolver
        .call("/api/tickets", RequestOptions::default())
        .await
        .unwrap();

    let tickets = value.as_array().unwrap();
    assert_eq!(tickets.len(), 1);
    assert_eq!(tickets[0]["ticket_id"], "TMS-1");
}

#[tokio::test]
async fn test_call_fails_when_no_endpoint_is_reachable() {
    let resolver = EndpointResolver::with_parts(
        ApiConfig {
            local_url: "http://127.0.0.1:1".to_string(),
            deployed_url: "http://127.0.0.1:2".to_string(),
            request_timeout_seconds: 2,
            ..ApiConfig::default()
        },
        Arc::new(LocalDevEnv),
        Arc::new(ReqwestHttpClient::new()),
    );

    let err = resolver
        .call("/api/tickets", RequestOptions::default())
        .await
        .unwrap_err();

    match err {
        TmsError::AllEndpointsFailed { attempted, .. } => {
            assert_eq!(
                attempted,
                vec![
                    "http://127.0.0.1:1/api/tickets",
                    "http://127.0.0.1:2/api/tickets"
                ]
            );
        }
        other => panic!("expected AllEndpointsFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_probe_reports_unreachable_and_reachable() {
    let addr = start_backend().await;
    let resolver = resolver_for(addr, "http://127.0.0.1:1");

    let probes = resolver.probe("/api/tickets").await;
    assert_eq!(probes.len(), 2);
    assert!(!probes[0].reachable);
    assert!(probes[1].reachable);
    assert_eq!(probes[1].status, Some(200));
}

#[tokio::test]
async fn test_channel_receives_pushed_notification() {
    let addr = start_backend().await;
    let resolver = Arc::new(resolver_for(addr, "http://127.0.0.1:1"));
    let channel = NotificationChannel::new(channel_config(addr, "/ws/notifications/"), resolver);
    let mut events = channel.subscribe();

    channel.connect().await.unwrap();
    assert!(channel.is_connected().await);

    let deadline = tokio::time::Instant::now() + POLL_DEADLINE;
    while channel.unread_count().await != 1 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "notification was not delivered within deadline"
        );
        tokio::time::sleep(POLL_STEP).await;
    }

    let notifications = channel.notifications().await;
    assert_eq!(notifications[0].ticket_id, "TMS-1042");

    let mut saw_notification = false;
    while let Ok(Ok(event)) = tokio::time::timeout(Duration::from_millis(200), events.recv()).await
    {
        if matches!(event, ChannelEvent::NotificationReceived(_)) {
            saw_notification = true;
            break;
        }
    }
    assert!(saw_notification);

    channel.close().await.unwrap();
    assert_eq!(channel.status().await, ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn test_channel_survives_heartbeat_round_trip() {
    let addr = start_backend().await;
    let resolver = Arc::new(resolver_for(addr, "http://127.0.0.1:1"));
    let channel = NotificationChannel::new(channel_config(addr, "/ws/notifications/"), resolver);

    channel.connect().await.unwrap();

    // Heartbeat interval is one second; ride out two full cycles
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(channel.is_connected().await);

    channel.close().await.unwrap();
}

#[tokio::test]
async fn test_server_close_marks_channel_disconnected() {
    let addr = start_backend().await;
    let resolver = Arc::new(resolver_for(addr, "http://127.0.0.1:1"));
    let channel = NotificationChannel::new(channel_config(addr, "/ws/once/"), resolver);

    channel.connect().await.unwrap();

    let deadline = tokio::time::Instant::now() + POLL_DEADLINE;
    while channel.status().await != ConnectionStatus::Disconnected {
        assert!(
            tokio::time::Instant::now() < deadline,
            "channel did not notice the server close within deadline"
        );
        tokio::time::sleep(POLL_STEP).await;
    }

    // The notification pushed before the close is retained
    assert_eq!(channel.notifications().await.len(), 1);

    channel.close().await.unwrap();
}
