//! In-memory notification buffer

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::events::{NotificationFrame, Priority};

/// A buffered notification about ticket activity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Unique within the buffer for the session
    pub id: u64,
    pub ticket_id: String,
    pub subject: String,
    pub priority: Priority,
    pub status: String,
    pub message: String,
    pub timestamp: String,
    #[serde(default)]
    pub read: bool,
}

/// Session-scoped notification buffer, newest first
///
/// Not persisted; the buffer lives and dies with the owning channel.
#[derive(Debug)]
pub struct NotificationStore {
    items: Vec<Notification>,
    unread: usize,
    next_id: u64,
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationStore {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            unread: 0,
            next_id: 1,
        }
    }

    /// Buffer an inbound frame as unread, newest first
    ///
    /// A frame without an id (or with an id already buffered) gets a
    /// generated one; generated ids never collide within the session.
    pub fn push_frame(&mut self, frame: NotificationFrame) -> Notification {
        let id = match frame.id {
            Some(id) if !self.contains(id) => {
                self.next_id = self.next_id.max(id + 1);
                id
            }
            _ => self.generate_id(),
        };

        let notification = Notification {
            id,
            ticket_id: frame.ticket_id,
            subject: frame.subject,
            priority: frame.priority,
            status: frame.status,
            message: frame.message,
            timestamp: frame.timestamp,
            read: false,
        };

        self.items.insert(0, notification.clone());
        self.unread += 1;
        notification
    }

    /// Replace the buffer with a history snapshot, all unread
    ///
    /// Snapshot order is preserved as given by the backend (newest first).
    pub fn replace_all(&mut self, frames: Vec<NotificationFrame>) {
        self.items.clear();
        self.unread = 0;
        for frame in frames {
            let id = match frame.id {
                Some(id) if !self.contains(id) => {
                    self.next_id = self.next_id.max(id + 1);
                    id
                }
                _ => self.generate_id(),
            };
            self.items.push(Notification {
                id,
                ticket_id: frame.ticket_id,
                subject: frame.subject,
                priority: frame.priority,
                status: frame.status,
                message: frame.message,
                timestamp: frame.timestamp,
                read: false,
            });
            self.unread += 1;
        }
    }

    /// Mark a buffered notification as read
    ///
    /// Returns true if the flag changed; the unread counter never goes
    /// below zero.
    pub fn mark_as_read(&mut self, id: u64) -> bool {
        if let Some(item) = self.items.iter_mut().find(|n| n.id == id) {
            if !item.read {
                item.read = true;
                self.unread = self.unread.saturating_sub(1);
                return true;
            }
        }
        false
    }

    /// Empty the buffer and reset the unread counter
    pub fn clear_all(&mut self) {
        self.items.clear();
        self.unread = 0;
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.items
    }

    pub fn unread_count(&self) -> usize {
        self.unread
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn contains(&self, id: u64) -> bool {
        self.items.iter().any(|n| n.id == id)
    }

    fn generate_id(&mut self) -> u64 {
        let mut id = self.next_id;
        while self.contains(id) {
            id += 1;
        }
        self.next_id = id + 1;
        id
    }
}

/// Thread-safe notification buffer handle
pub type StoreHandle = Arc<RwLock<NotificationStore>>;

pub fn new_store_handle() -> StoreHandle {
    Arc::new(RwLock::new(NotificationStore::new()))
}
