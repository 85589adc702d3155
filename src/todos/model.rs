//! Todo record and its read models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

pub type TodoId = u64;

pub const TITLE_MAX_LENGTH: u64 = 200;
pub const DESCRIPTION_MAX_LENGTH: u64 = 1000;
pub const PRIORITY_MIN: u8 = 1;
pub const PRIORITY_MAX: u8 = 5;

// == Todo ==
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Todo {
    pub id: TodoId,
    pub title: String,
    pub description: Option<String>,
    pub priority: u8,
    pub is_completed: bool,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Todo {
    pub fn new(id: TodoId, title: String, description: Option<String>, priority: u8) -> Self {
        Self {
            id,
            title,
            description,
            priority,
            is_completed: false,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Marks the todo completed. Completing twice is a conflict.
    pub fn complete(&mut self, at: DateTime<Utc>) -> AppResult<()> {
        if self.is_completed {
            return Err(already_completed(self.id));
        }
        self.is_completed = true;
        self.completed_at = Some(at);
        Ok(())
    }
}

pub fn not_found(id: TodoId) -> AppError {
    AppError::not_found("Todo.NotFound", format!("todo {} does not exist", id))
}

pub fn already_completed(id: TodoId) -> AppError {
    AppError::conflict(
        "Todo.AlreadyCompleted",
        format!("todo {} is already completed", id),
    )
}

// == Read Models ==
/// Cached and returned by the todo queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoResponse {
    pub id: TodoId,
    pub title: String,
    pub description: Option<String>,
    pub priority: u8,
    pub is_completed: bool,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Todo> for TodoResponse {
    fn from(todo: Todo) -> Self {
        Self {
            id: todo.id,
            title: todo.title,
            description: todo.description,
            priority: todo.priority,
            is_completed: todo.is_completed,
            created_at: todo.created_at,
            completed_at: todo.completed_at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoPage {
    pub items: Vec<TodoResponse>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
}
