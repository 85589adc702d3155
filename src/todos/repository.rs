//! Todo persistence.
//!
//! The repository owns the records and raises the domain events once a
//! change is stored. Handlers only see the [`TodoRepository`] trait.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::AppResult;
use crate::pipeline::EventBus;
use crate::todos::events::{TodoCompleted, TodoCreated, TodoDeleted};
use crate::todos::model::{already_completed, not_found, Todo, TodoId};

#[async_trait]
pub trait TodoRepository: Send + Sync + 'static {
    /// Stores a new open todo and returns it with its assigned id.
    async fn add(&self, title: String, description: Option<String>, priority: u8)
        -> AppResult<Todo>;

    async fn find(&self, id: TodoId) -> AppResult<Option<Todo>>;

    /// One page of todos ordered by id, plus the total count. Pages start at 1.
    async fn list(&self, page: u32, page_size: u32) -> AppResult<(Vec<Todo>, u64)>;

    /// Replaces an existing todo.
    ///
    /// Completion happens once: saving a completed todo over a stored one
    /// that is already completed is a `Todo.AlreadyCompleted` conflict.
    async fn save(&self, todo: Todo) -> AppResult<()>;

    /// Returns `false` when the todo did not exist.
    async fn remove(&self, id: TodoId) -> AppResult<bool>;
}

// == In-Memory Repository ==
pub struct InMemoryTodoRepository {
    todos: RwLock<BTreeMap<TodoId, Todo>>,
    next_id: AtomicU64,
    events: EventBus,
}

impl InMemoryTodoRepository {
    pub fn new(events: EventBus) -> Self {
        Self {
            todos: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            events,
        }
    }

    pub async fn len(&self) -> usize {
        self.todos.read().await.len()
    }
}

#[async_trait]
impl TodoRepository for InMemoryTodoRepository {
    async fn add(
        &self,
        title: String,
        description: Option<String>,
        priority: u8,
    ) -> AppResult<Todo> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let todo = Todo::new(id, title, description, priority);
        self.todos.write().await.insert(id, todo.clone());
        debug!(todo_id = id, "Todo stored");

        self.events
            .publish(TodoCreated {
                event_id: Uuid::new_v4(),
                id,
                title: todo.title.clone(),
            })
            .await;
        Ok(todo)
    }

    async fn find(&self, id: TodoId) -> AppResult<Option<Todo>> {
        Ok(self.todos.read().await.get(&id).cloned())
    }

    async fn list(&self, page: u32, page_size: u32) -> AppResult<(Vec<Todo>, u64)> {
        let todos = self.todos.read().await;
        let skip = (page.max(1) as usize - 1).saturating_mul(page_size as usize);
        let items = todos
            .values()
            .skip(skip)
            .take(page_size as usize)
            .cloned()
            .collect();
        Ok((items, todos.len() as u64))
    }

    async fn save(&self, todo: Todo) -> AppResult<()> {
        let completed = {
            let mut todos = self.todos.write().await;
            let existing = todos.get_mut(&todo.id).ok_or_else(|| not_found(todo.id))?;
            if existing.is_completed && todo.is_completed {
                return Err(already_completed(todo.id));
            }
            let completed = !existing.is_completed && todo.is_completed;
            *existing = todo.clone();
            completed
        };

        if completed {
            self.events
                .publish(TodoCompleted {
                    event_id: Uuid::new_v4(),
                    id: todo.id,
                    completed_at: todo.completed_at.unwrap_or_else(Utc::now),
                })
                .await;
        }
        Ok(())
    }

    async fn remove(&self, id: TodoId) -> AppResult<bool> {
        let removed = self.todos.write().await.remove(&id).is_some();
        if removed {
            self.events
                .publish(TodoDeleted {
                    event_id: Uuid::new_v4(),
                    id,
                })
                .await;
        }
        Ok(removed)
    }
}
