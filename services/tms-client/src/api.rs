//! Typed wrappers over the resolver for the TMS backend surface

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TmsError};
use crate::events::{NotificationFrame, Priority};
use crate::io::Method;
use crate::resolver::{EndpointResolver, RequestOptions};

/// Lifecycle status of a ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Open,
    Pending,
    Closed,
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TicketStatus::Open => write!(f, "open"),
            TicketStatus::Pending => write!(f, "pending"),
            TicketStatus::Closed => write!(f, "closed"),
        }
    }
}

impl std::str::FromStr for TicketStatus {
    type Err = TmsError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "open" => Ok(TicketStatus::Open),
            "pending" => Ok(TicketStatus::Pending),
            "closed" => Ok(TicketStatus::Closed),
            _ => Err(TmsError::InvalidValue(format!("Unknown status: {}", s))),
        }
    }
}

/// A support/abuse ticket as returned by the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub ticket_id: String,
    pub subject: String,
    pub status: TicketStatus,
    pub priority: Priority,
    pub received_at: String,
}

/// One entry of the backend's activity log
#[derive(Debug, Clone, Deserialize)]
pub struct ActivityLog {
    pub id: String,
    pub activity_type: String,
    pub severity: String,
    pub description: String,
    #[serde(default)]
    pub related_ticket: Option<RelatedTicket>,
    pub created_at: String,
}

/// Ticket reference attached to an activity log entry
#[derive(Debug, Clone, Deserialize)]
pub struct RelatedTicket {
    pub ticket_id: String,
    pub subject: String,
}

#[derive(Debug, Deserialize)]
struct ActivityLogEnvelope {
    #[serde(default)]
    activities: Vec<ActivityLog>,
}

#[derive(Debug, Deserialize)]
struct NotificationHistory {
    success: bool,
    #[serde(default)]
    notifications: Vec<NotificationFrame>,
}

/// Typed client for the TMS backend API
///
/// All requests go through the resolver, so every operation inherits the
/// endpoint fallback behavior.
#[derive(Clone)]
pub struct TmsApi {
    resolver: Arc<EndpointResolver>,
}

impl TmsApi {
    pub fn new(resolver: Arc<EndpointResolver>) -> Self {
        Self { resolver }
    }

    /// List all tickets
    ///
    /// The backend is expected to answer with a JSON array; anything else is
    /// an error rather than a silently empty list.
    pub async fn list_tickets(&self) -> Result<Vec<Ticket>> {
        let value = self
            .resolver
            .call("/api/tickets", RequestOptions::default())
            .await?;

        if !value.is_array() {
            return Err(TmsError::UnexpectedResponse(format!(
                "Expected a ticket array, got {}",
                json_type_name(&value)
            )));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Fetch a single ticket by id
    pub async fn get_ticket(&self, ticket_id: &str) -> Result<Ticket> {
        self.resolver
            .call_as(
                &format!("/api/tickets/{}", ticket_id),
                RequestOptions::default(),
            )
            .await
    }

    /// Update a ticket's status
    pub async fn update_ticket_status(
        &self,
        ticket_id: &str,
        status: TicketStatus,
    ) -> Result<Ticket> {
        let options = RequestOptions::default()
            .method(Method::Patch)
            .data(serde_json::json!({ "status": status }));
        self.resolver
            .call_as(&format!("/api/tickets/{}", ticket_id), options)
            .await
    }

    /// Aggregated ticket analytics over the given number of days
    ///
    /// The shape of the report is owned by the backend, so it is returned as
    /// raw JSON.
    pub async fn ticket_analytics(&self, days: u32) -> Result<serde_json::Value> {
        self.resolver
            .call(
                &format!("/api/tickets/analytics?days={}", days),
                RequestOptions::default(),
            )
            .await
    }

    /// Recent activity log entries
    pub async fn activity_logs(&self) -> Result<Vec<ActivityLog>> {
        let envelope: ActivityLogEnvelope = self
            .resolver
            .call_as("/api/activity-logs/", RequestOptions::default())
            .await?;
        Ok(envelope.activities)
    }

    /// Recent-history snapshot of ticket notifications
    pub async fn recent_notifications(
        &self,
        hours: u32,
        limit: u32,
    ) -> Result<Vec<NotificationFrame>> {
        let envelope: NotificationHistory = self
            .resolver
            .call_as(
                &format!("/api/notifications?hours={}&limit={}", hours, limit),
                RequestOptions::default(),
            )
            .await?;

        if !envelope.success {
            return Err(TmsError::UnexpectedResponse(
                "Notification history request was not successful".to_string(),
            ));
        }
        Ok(envelope.notifications)
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
