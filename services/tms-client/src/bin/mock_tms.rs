//! Mock TMS backend for testing
//!
//! Serves the minimal backend surface the client talks to: the tickets and
//! notification-history endpoints plus the notification WebSocket. The
//! socket pushes one canned notification on connect and answers every
//! `{"type":"ping"}` with `{"type":"pong"}`.
//!
//! Usage:
//!   mock_tms [PORT]
//!
//! The port can also be set via the MOCK_TMS_PORT environment variable.
//! Command line argument takes precedence over environment variable.
//! Default port is 8000 (same as the real backend).

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::Query;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct HistoryParams {
    #[serde(default = "default_hours")]
    hours: u32,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_hours() -> u32 {
    24
}

fn default_limit() -> usize {
    20
}

#[tokio::main]
async fn main() {
    // Port priority: command line arg > environment variable > default (8000)
    let port = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .or_else(|| {
            std::env::var("MOCK_TMS_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
        })
        .unwrap_or(8000u16);

    eprintln!("Mock TMS starting on port {}", port);

    let app = Router::new()
        .route("/api/tickets", get(tickets_handler))
        .route("/api/tickets/{ticket_id}", get(ticket_handler))
        .route("/api/notifications", get(notifications_handler))
        .route("/ws/notifications/", get(ws_handler));

    let listener = match tokio::net::TcpListener::bind(("127.0.0.1", port)).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind to port {}: {}", port, e);
            std::process::exit(1);
        }
    };

    eprintln!("Mock TMS listening on port {}", port);

    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}

fn canned_tickets() -> serde_json::Value {
    json!([
        {
            "ticket_id": "TMS-1001",
            "subject": "Phishing report",
            "status": "open",
            "priority": "high",
            "received_at": "2025-06-01T09:15:00Z"
        },
        {
            "ticket_id": "TMS-1002",
            "subject": "Spam complaint",
            "status": "pending",
            "priority": "medium",
            "received_at": "2025-06-01T10:40:00Z"
        },
        {
            "ticket_id": "TMS-1003",
            "subject": "Copyright notice",
            "status": "closed",
            "priority": "low",
            "received_at": "2025-05-31T16:05:00Z"
        }
    ])
}

async fn tickets_handler() -> impl IntoResponse {
    Json(canned_tickets())
}

async fn ticket_handler(
    axum::extract::Path(ticket_id): axum::extract::Path<String>,
) -> impl IntoResponse {
    Json(json!({
        "ticket_id": ticket_id,
        "subject": "Phishing report",
        "status": "open",
        "priority": "high",
        "received_at": "2025-06-01T09:15:00Z"
    }))
}

async fn notifications_handler(Query(params): Query<HistoryParams>) -> impl IntoResponse {
    eprintln!(
        "History requested: hours={}, limit={}",
        params.hours, params.limit
    );

    let notifications: Vec<serde_json::Value> = vec![
        json!({
            "id": 1,
            "ticket_id": "TMS-1001",
            "subject": "Phishing report",
            "priority": "high",
            "status": "open",
            "message": "New abuse complaint received",
            "timestamp": chrono::Utc::now().to_rfc3339()
        }),
        json!({
            "id": 2,
            "ticket_id": "TMS-1002",
            "subject": "Spam complaint",
            "priority": "medium",
            "status": "pending",
            "message": "New abuse complaint received",
            "timestamp": chrono::Utc::now().to_rfc3339()
        }),
    ]
    .into_iter()
    .take(params.limit)
    .collect();

    Json(json!({
        "success": true,
        "notifications": notifications
    }))
}

async fn ws_handler(ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(handle_socket)
}

async fn handle_socket(mut socket: WebSocket) {
    eprintln!("WebSocket client connected");

    let notification = json!({
        "type": "notification",
        "ticket_id": "TMS-1042",
        "subject": "Phishing report",
        "priority": "high",
        "status": "open",
        "message": "New abuse complaint received",
        "timestamp": chrono::Utc::now().to_rfc3339()
    });
    if socket
        .send(Message::Text(notification.to_string().into()))
        .await
        .is_err()
    {
        return;
    }

    while let Some(message) = socket.recv().await {
        let message = match message {
            Ok(m) => m,
            Err(e) => {
                eprintln!("WebSocket error: {}", e);
                break;
            }
        };

        match message {
            Message::Text(text) => {
                eprintln!("Received: {}", text.as_str());
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

    eprintln!("WebSocket client disconnected");
}
