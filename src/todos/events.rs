//! Domain events raised when a todo is saved.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::error::AppResult;
use crate::pipeline::{Event, NotificationHandler};
use crate::todos::model::TodoId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoCreated {
    pub event_id: Uuid,
    pub id: TodoId,
    pub title: String,
}

impl Event for TodoCreated {
    const NAME: &'static str = "TodoCreated";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoCompleted {
    pub event_id: Uuid,
    pub id: TodoId,
    pub completed_at: DateTime<Utc>,
}

impl Event for TodoCompleted {
    const NAME: &'static str = "TodoCompleted";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoDeleted {
    pub event_id: Uuid,
    pub id: TodoId,
}

impl Event for TodoDeleted {
    const NAME: &'static str = "TodoDeleted";
}

// == Audit Log ==
/// Writes every todo event to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TodoAuditLog;

#[async_trait]
impl NotificationHandler<TodoCreated> for TodoAuditLog {
    async fn handle(&self, event: TodoCreated) -> AppResult<()> {
        info!(event_id = %event.event_id, todo_id = event.id, title = %event.title, "Todo created");
        Ok(())
    }
}

#[async_trait]
impl NotificationHandler<TodoCompleted> for TodoAuditLog {
    async fn handle(&self, event: TodoCompleted) -> AppResult<()> {
        info!(
            event_id = %event.event_id,
            todo_id = event.id,
            completed_at = %event.completed_at.to_rfc3339(),
            "Todo completed"
        );
        Ok(())
    }
}

#[async_trait]
impl NotificationHandler<TodoDeleted> for TodoAuditLog {
    async fn handle(&self, event: TodoDeleted) -> AppResult<()> {
        info!(event_id = %event.event_id, todo_id = event.id, "Todo deleted");
        Ok(())
    }
}
