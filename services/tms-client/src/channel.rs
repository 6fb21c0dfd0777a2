//! Realtime notification channel
//!
//! Owns exactly one socket and one notification buffer. A reader task parses
//! inbound frames, a heartbeat task pings on a fixed interval, and a
//! reconnect task restores dropped connections with capped exponential
//! backoff. All of it hides behind the same public interface, so consumers
//! only ever see the connection status, the buffer, and the event stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, Mutex, Notify, RwLock};
use tracing::{debug, info, warn};

use crate::alerts::AlertSink;
use crate::api::TmsApi;
use crate::config::ChannelConfig;
use crate::error::{Result, TmsError};
use crate::events::{ChannelEvent, Frame};
use crate::io::{FrameReader, FrameWriter, SocketFactory, SocketPair, WsSocketFactory};
use crate::resolver::EndpointResolver;
use crate::store::{new_store_handle, Notification, StoreHandle};

/// Connection state of the notification channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "Disconnected"),
            ConnectionStatus::Connecting => write!(f, "Connecting"),
            ConnectionStatus::Connected => write!(f, "Connected"),
        }
    }
}

/// Shared state between the channel and its background tasks
#[derive(Clone)]
struct SharedChannelState {
    status: Arc<RwLock<ConnectionStatus>>,
    writer: Arc<Mutex<Option<Box<dyn FrameWriter>>>>,
    store: StoreHandle,
    event_sender: broadcast::Sender<ChannelEvent>,
    reader_handle: Arc<Mutex<Option<tokio::task::JoinHandle<()>>>>,
    heartbeat_handle: Arc<Mutex<Option<tokio::task::JoinHandle<()>>>>,
    reconnect_handle: Arc<Mutex<Option<tokio::task::JoinHandle<()>>>>,
    reconnect_enabled: Arc<AtomicBool>,
    stop: Arc<Notify>,
    factory: Arc<dyn SocketFactory>,
    alerts: Arc<Vec<Arc<dyn AlertSink>>>,
}

impl SharedChannelState {
    fn new(
        reconnect_enabled: bool,
        factory: Arc<dyn SocketFactory>,
        alerts: Vec<Arc<dyn AlertSink>>,
    ) -> Self {
        let (event_sender, _) = broadcast::channel(100);
        Self {
            status: Arc::new(RwLock::new(ConnectionStatus::Disconnected)),
            writer: Arc::new(Mutex::new(None)),
            store: new_store_handle(),
            event_sender,
            reader_handle: Arc::new(Mutex::new(None)),
            heartbeat_handle: Arc::new(Mutex::new(None)),
            reconnect_handle: Arc::new(Mutex::new(None)),
            reconnect_enabled: Arc::new(AtomicBool::new(reconnect_enabled)),
            stop: Arc::new(Notify::new()),
            factory,
            alerts: Arc::new(alerts),
        }
    }

    async fn set_status(&self, status: ConnectionStatus) {
        *self.status.write().await = status;
    }
}

/// Send one frame through the current writer, if any
async fn send_frame(shared: &SharedChannelState, frame: &str) -> Result<()> {
    let mut writer = shared.writer.lock().await;
    match writer.as_mut() {
        Some(w) => w.send_frame(frame).await,
        None => Err(TmsError::NotConnected),
    }
}

/// Handle one inbound frame
async fn handle_frame(shared: &SharedChannelState, line: &str) {
    match serde_json::from_str::<Frame>(line) {
        Ok(Frame::Notification(frame)) => {
            let notification = { shared.store.write().await.push_frame(frame) };
            debug!(
                "Buffered notification {} for ticket {}",
                notification.id, notification.ticket_id
            );
            let _ = shared
                .event_sender
                .send(ChannelEvent::NotificationReceived(notification.clone()));

            for sink in shared.alerts.iter() {
                if let Err(e) = sink.alert(&notification).await {
                    warn!("Alert sink {} failed: {}", sink.type_name(), e);
                }
            }
        }
        Ok(Frame::Pong) => {
            // Liveness acknowledgement only. The next ping goes out on the
            // fixed heartbeat tick, never as an immediate reply.
            debug!("Heartbeat pong received");
        }
        Ok(Frame::Ping) => {
            debug!("Server ping received, replying with pong");
            if let Err(e) = send_frame(shared, Frame::PONG).await {
                debug!("Failed to reply to server ping: {}", e);
            }
        }
        Err(e) => {
            warn!("Dropping malformed frame: {}", e);
        }
    }
}

/// Install an established socket: writer, status, reader and heartbeat tasks
async fn install_connection(
    pair: SocketPair,
    config: &ChannelConfig,
    shared: &SharedChannelState,
) {
    {
        let mut writer = shared.writer.lock().await;
        *writer = Some(pair.writer);
    }
    shared.set_status(ConnectionStatus::Connected).await;

    let reader_handle = spawn_reader_task(pair.reader, config.clone(), shared.clone());
    {
        let mut handle = shared.reader_handle.lock().await;
        if let Some(old) = handle.replace(reader_handle) {
            old.abort();
        }
    }

    let heartbeat_handle = spawn_heartbeat_task(config.clone(), shared.clone());
    {
        let mut handle = shared.heartbeat_handle.lock().await;
        if let Some(old) = handle.replace(heartbeat_handle) {
            old.abort();
        }
    }
}

/// Spawn the reader task that drains inbound frames until the feed drops
fn spawn_reader_task(
    mut reader: Box<dyn FrameReader>,
    config: ChannelConfig,
    shared: SharedChannelState,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let disconnect_reason;

        loop {
            match reader.next_frame().await {
                Ok(None) => {
                    debug!("Notification feed closed");
                    disconnect_reason = "Connection closed by remote".to_string();
                    break;
                }
                Ok(Some(line)) => {
                    if line.is_empty() {
                        continue;
                    }
                    debug!("Received frame: {}", line);
                    handle_frame(&shared, &line).await;
                }
                Err(e) => {
                    debug!("Error reading from notification feed: {}", e);
                    disconnect_reason = format!("Read error: {}", e);
                    break;
                }
            }
        }

        // Connection lost. Buffered notifications stay visible; only the
        // transport is gone.
        shared.set_status(ConnectionStatus::Disconnected).await;
        warn!("Notification feed lost: {}", disconnect_reason);
        let _ = shared.event_sender.send(ChannelEvent::Disconnected {
            reason: disconnect_reason,
        });

        // Stop the heartbeat for this connection
        {
            let mut handle = shared.heartbeat_handle.lock().await;
            if let Some(h) = handle.take() {
                h.abort();
            }
        }

        // Close the writer
        {
            let mut writer = shared.writer.lock().await;
            if let Some(mut w) = writer.take() {
                let _ = w.close().await;
            }
        }

        if shared.reconnect_enabled.load(Ordering::SeqCst) {
            debug!("Reconnect enabled, starting reconnection task");
            let task = spawn_reconnect_task(config, shared.clone());
            let mut handle = shared.reconnect_handle.lock().await;
            if let Some(old) = handle.replace(task) {
                old.abort();
            }
        }
    })
}

/// Spawn the heartbeat task: one ping per interval while connected
fn spawn_heartbeat_task(
    config: ChannelConfig,
    shared: SharedChannelState,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let interval = Duration::from_secs(config.heartbeat_interval_seconds);
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shared.stop.notified() => {
                    debug!("Heartbeat stopped");
                    break;
                }
            }

            match send_frame(&shared, Frame::PING).await {
                Ok(()) => debug!("Heartbeat ping sent"),
                Err(e) => {
                    debug!("Heartbeat ended: {}", e);
                    break;
                }
            }
        }
    })
}

/// Spawn the reconnection task: retry with capped exponential backoff
fn spawn_reconnect_task(
    config: ChannelConfig,
    shared: SharedChannelState,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        shared.set_status(ConnectionStatus::Connecting).await;

        let timeout = Duration::from_secs(config.connection_timeout_seconds);
        let max_backoff = Duration::from_secs(config.reconnect.max_backoff_seconds);
        let mut backoff = Duration::from_secs(config.reconnect.initial_backoff_seconds);
        let max_retries = config.reconnect.max_retries;
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            if !shared.reconnect_enabled.load(Ordering::SeqCst) {
                debug!("Reconnect disabled, stopping reconnection attempts");
                give_up(&shared, "Reconnect disabled").await;
                break;
            }

            if let Some(max) = max_retries {
                if attempt > max {
                    warn!("Reconnection failed: max retries ({}) exceeded", max);
                    give_up(&shared, &format!("Max retries ({}) exceeded", max)).await;
                    break;
                }
            }

            info!(
                "Reconnecting to notification feed (attempt {}/{})",
                attempt,
                max_retries.map_or("unlimited".to_string(), |m| m.to_string())
            );
            let _ = shared.event_sender.send(ChannelEvent::Reconnecting {
                attempt,
                max_attempts: max_retries,
            });

            match shared.factory.connect(&config.url, timeout).await {
                Ok(pair) => {
                    install_connection(pair, &config, &shared).await;
                    info!("Reconnected to notification feed");
                    let _ = shared.event_sender.send(ChannelEvent::Connected);
                    return;
                }
                Err(e) => {
                    debug!("Reconnection attempt {} failed: {}", attempt, e);
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = shared.stop.notified() => {
                    debug!("Reconnection stopped");
                    give_up(&shared, "Reconnection cancelled").await;
                    break;
                }
            }
            backoff = (backoff * 2).min(max_backoff);
        }
    })
}

async fn give_up(shared: &SharedChannelState, reason: &str) {
    shared.set_status(ConnectionStatus::Disconnected).await;
    let _ = shared.event_sender.send(ChannelEvent::ReconnectGaveUp {
        reason: reason.to_string(),
    });
}

/// Realtime feed of ticket notifications
///
/// One instance owns one socket and one buffer. Call
/// [`close`](Self::close) when the owning context is torn down so the
/// connection does not leak.
pub struct NotificationChannel {
    config: ChannelConfig,
    shared: SharedChannelState,
    api: TmsApi,
}

impl NotificationChannel {
    /// Create a channel with the production WebSocket factory and no sinks
    pub fn new(config: ChannelConfig, resolver: Arc<EndpointResolver>) -> Self {
        Self::with_parts(config, resolver, Arc::new(WsSocketFactory::new()), Vec::new())
    }

    /// Create a channel with an injected socket factory and alert sinks
    ///
    /// This is useful for testing with mock sockets.
    pub fn with_parts(
        config: ChannelConfig,
        resolver: Arc<EndpointResolver>,
        factory: Arc<dyn SocketFactory>,
        alerts: Vec<Arc<dyn AlertSink>>,
    ) -> Self {
        let reconnect_enabled = config.reconnect.enabled;
        Self {
            config,
            shared: SharedChannelState::new(reconnect_enabled, factory, alerts),
            api: TmsApi::new(resolver),
        }
    }

    /// Open the socket and start the reader and heartbeat tasks
    pub async fn connect(&self) -> Result<()> {
        // Stop any ongoing reconnection attempt
        self.shared.stop.notify_waiters();
        {
            let mut handle = self.shared.reconnect_handle.lock().await;
            if let Some(h) = handle.take() {
                h.abort();
            }
        }

        self.shared.set_status(ConnectionStatus::Connecting).await;
        debug!("Connecting to notification feed at {}", self.config.url);

        let timeout = Duration::from_secs(self.config.connection_timeout_seconds);
        match self.shared.factory.connect(&self.config.url, timeout).await {
            Ok(pair) => {
                install_connection(pair, &self.config, &self.shared).await;
                let _ = self.shared.event_sender.send(ChannelEvent::Connected);
                debug!("Notification channel connected");
                Ok(())
            }
            Err(e) => {
                self.shared.set_status(ConnectionStatus::Disconnected).await;
                Err(e)
            }
        }
    }

    /// Close the socket and stop all background tasks
    pub async fn close(&self) -> Result<()> {
        debug!("Closing notification channel");

        self.shared.stop.notify_waiters();
        for slot in [
            &self.shared.reconnect_handle,
            &self.shared.reader_handle,
            &self.shared.heartbeat_handle,
        ] {
            let mut handle = slot.lock().await;
            if let Some(h) = handle.take() {
                h.abort();
            }
        }

        {
            let mut writer = self.shared.writer.lock().await;
            if let Some(mut w) = writer.take() {
                let _ = w.close().await;
            }
        }

        self.shared.set_status(ConnectionStatus::Disconnected).await;
        debug!("Notification channel closed");
        Ok(())
    }

    pub async fn status(&self) -> ConnectionStatus {
        *self.shared.status.read().await
    }

    pub async fn is_connected(&self) -> bool {
        self.status().await == ConnectionStatus::Connected
    }

    /// Subscribe to channel events
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.shared.event_sender.subscribe()
    }

    /// Check if automatic reconnection is enabled
    pub fn is_reconnect_enabled(&self) -> bool {
        self.shared.reconnect_enabled.load(Ordering::SeqCst)
    }

    /// Enable or disable automatic reconnection
    ///
    /// Disabling during an active reconnection stops it after the current
    /// connection try completes.
    pub fn set_reconnect_enabled(&self, enabled: bool) {
        debug!("Setting reconnect enabled: {}", enabled);
        self.shared.reconnect_enabled.store(enabled, Ordering::SeqCst);
        if !enabled {
            self.shared.stop.notify_waiters();
        }
    }

    /// Replace the buffer with a recent-history snapshot from the backend
    ///
    /// Returns the number of buffered notifications. Socket-delivered events
    /// received before the snapshot are discarded in favor of it.
    pub async fn fetch_notifications(&self) -> Result<usize> {
        let frames = self
            .api
            .recent_notifications(self.config.history_hours, self.config.history_limit)
            .await?;

        let mut store = self.shared.store.write().await;
        store.replace_all(frames);
        Ok(store.len())
    }

    /// Snapshot of the buffered notifications, newest first
    pub async fn notifications(&self) -> Vec<Notification> {
        self.shared.store.read().await.notifications().to_vec()
    }

    pub async fn unread_count(&self) -> usize {
        self.shared.store.read().await.unread_count()
    }

    /// Mark a buffered notification as read; returns true if the flag changed
    pub async fn mark_as_read(&self, id: u64) -> bool {
        self.shared.store.write().await.mark_as_read(id)
    }

    /// Empty the buffer and reset the unread counter
    pub async fn clear_all(&self) {
        self.shared.store.write().await.clear_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_status_displays() {
        assert_eq!(ConnectionStatus::Disconnected.to_string(), "Disconnected");
        assert_eq!(ConnectionStatus::Connecting.to_string(), "Connecting");
        assert_eq!(ConnectionStatus::Connected.to_string(), "Connected");
    }

    #[test]
    fn connection_status_serializes_lowercase() {
        let json = serde_json::to_string(&ConnectionStatus::Connected).unwrap();
        assert_eq!(json, r#""connected""#);
    }
}
