//! Audit logging.
//!
//! Mutations describe what they did as an [`ActivityEvent`] and publish it
//! through an [`ActivityLog`] handle. A subscriber task owns persistence:
//! it writes entries in publish order and reports its own failures through
//! `tracing`. Publishing never waits on the database and never fails the
//! operation that published, so the audit trail is best-effort and is not
//! part of the mutation's transaction.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{header::USER_AGENT, request::Parts},
};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::model::{ActivityAction, ActivityEntry};
use crate::storage::{Storage, current_timestamp};

/// Entity type recorded when none is given.
pub const DEFAULT_ENTITY_TYPE: &str = "Contact";

/// Actor recorded for requests arriving over HTTP.
pub const HTTP_ACTOR: &str = "User";

/// Who performed an action and from where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub performed_by: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self {
            performed_by: "System".to_string(),
            ip_address: None,
            user_agent: None,
        }
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        let ip_address = forwarded.or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        });

        let user_agent = parts
            .headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(Self {
            performed_by: HTTP_ACTOR.to_string(),
            ip_address,
            user_agent,
        })
    }
}

/// A fact about a completed mutation, waiting to be persisted.
#[derive(Debug, Clone)]
pub struct ActivityEvent {
    pub action: ActivityAction,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub entity_name: String,
    pub changes: Map<String, Value>,
    pub context: RequestContext,
    pub occurred_at: DateTime<Utc>,
}

impl ActivityEvent {
    pub fn new(
        action: ActivityAction,
        entity_id: Option<&str>,
        entity_name: impl Into<String>,
        context: &RequestContext,
    ) -> Self {
        Self {
            action,
            entity_type: DEFAULT_ENTITY_TYPE.to_string(),
            entity_id: entity_id.map(str::to_string),
            entity_name: entity_name.into(),
            changes: Map::new(),
            context: context.clone(),
            occurred_at: current_timestamp(),
        }
    }

    pub fn with_changes(mut self, changes: Map<String, Value>) -> Self {
        self.changes = changes;
        self
    }

    pub fn with_change(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.changes.insert(key.to_string(), value.into());
        self
    }

    fn into_entry(self) -> ActivityEntry {
        ActivityEntry {
            id: uuid::Uuid::new_v4().to_string(),
            action: self.action,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            entity_name: self.entity_name,
            changes: self.changes,
            performed_by: self.context.performed_by,
            ip_address: self.context.ip_address,
            user_agent: self.context.user_agent,
            timestamp: self.occurred_at,
        }
    }
}

enum Message {
    Record(Box<ActivityEvent>),
    Flush(oneshot::Sender<()>),
}

/// Publishing handle for activity events. Cheap to clone.
#[derive(Clone)]
pub struct ActivityLog {
    sender: mpsc::UnboundedSender<Message>,
}

impl ActivityLog {
    /// Start the subscriber task that persists events into `storage`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(storage: Storage) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_subscriber(storage, receiver));
        Self { sender }
    }

    /// Publish an event. Returns immediately.
    pub fn record(&self, event: ActivityEvent) {
        let action = event.action;
        if self.sender.send(Message::Record(Box::new(event))).is_err() {
            warn!(action = action.as_str(), "Activity subscriber is gone; entry dropped");
        }
    }

    /// Wait until every event published before this call has been handled.
    pub async fn flush(&self) {
        let (done, waiter) = oneshot::channel();
        if self.sender.send(Message::Flush(done)).is_ok() {
            let _ = waiter.await;
        }
    }
}

async fn run_subscriber(storage: Storage, mut receiver: mpsc::UnboundedReceiver<Message>) {
    while let Some(message) = receiver.recv().await {
        match message {
            Message::Record(event) => {
                let entry = event.into_entry();
                match storage.insert_activity(&entry).await {
                    Ok(()) => debug!(
                        action = entry.action.as_str(),
                        entity_id = entry.entity_id.as_deref().unwrap_or("-"),
                        "Activity recorded"
                    ),
                    Err(e) => warn!(
                        action = entry.action.as_str(),
                        error = %e,
                        "Failed to log activity"
                    ),
                }
            }
            Message::Flush(done) => {
                let _ = done.send(());
            }
        }
    }

    debug!("Activity subscriber stopped");
}
