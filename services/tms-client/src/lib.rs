//! TMS backend client
//!
//! Fallback-aware endpoint resolution and a realtime WebSocket notification
//! channel for the TMS ticket-management backend. UI layers consume the
//! [`EndpointResolver`] for request/response work and subscribe to the
//! [`NotificationChannel`] for pushed ticket alerts.

pub mod alerts;
pub mod api;
pub mod channel;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod events;
pub mod io;
pub mod resolver;
pub mod store;

pub use api::{Ticket, TicketStatus, TmsApi};
pub use channel::{ConnectionStatus, NotificationChannel};
pub use config::{load_config, AlertConfig, ApiConfig, ChannelConfig, Config, ReconnectConfig};
pub use error::{Result, TmsError};
pub use events::{ChannelEvent, Frame, NotificationFrame, Priority};
pub use io::Method;
pub use resolver::{EndpointResolver, RequestOptions};
pub use store::Notification;

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::endpoints::SystemEnv;
use crate::io::{ReqwestHttpClient, WsSocketFactory};

/// Run the watch service with the given configuration
///
/// Connects the notification channel, fetches the initial history snapshot,
/// and logs channel events until ctrl-c.
pub async fn run(config: Config) -> Result<()> {
    let http: Arc<dyn io::HttpClient> = Arc::new(ReqwestHttpClient::new());
    let resolver = Arc::new(EndpointResolver::with_parts(
        config.api.clone(),
        Arc::new(SystemEnv::new()),
        Arc::clone(&http),
    ));
    let sinks = alerts::build_sinks(&config.alerts, Arc::clone(&http));

    let channel = NotificationChannel::with_parts(
        config.channel.clone(),
        Arc::clone(&resolver),
        Arc::new(WsSocketFactory::new()),
        sinks,
    );
    let mut events = channel.subscribe();

    if let Err(e) = channel.connect().await {
        warn!("Initial connection to the notification feed failed: {}", e);
    }

    match channel.fetch_notifications().await {
        Ok(count) => info!("Fetched {} recent notifications", count),
        Err(e) => warn!("Failed to fetch recent notifications: {}", e),
    }

    info!("Watching the notification feed");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            event = events.recv() => match event {
                Ok(ChannelEvent::NotificationReceived(n)) => {
                    info!(
                        "[{}] {}: {} ({} unread)",
                        n.priority,
                        n.ticket_id,
                        n.subject,
                        channel.unread_count().await
                    );
                }
                Ok(ChannelEvent::Connected) => info!("Notification feed connected"),
                Ok(ChannelEvent::Disconnected { reason }) => {
                    warn!("Notification feed disconnected: {}", reason);
                }
                Ok(ChannelEvent::Reconnecting { attempt, .. }) => {
                    info!("Reconnecting to the notification feed (attempt {})", attempt);
                }
                Ok(ChannelEvent::ReconnectGaveUp { reason }) => {
                    warn!("Gave up reconnecting: {}", reason);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Dropped {} channel events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    channel.close().await?;
    info!("Notification channel stopped");
    Ok(())
}
