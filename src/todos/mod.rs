//! Todos Feature
//!
//! The record type served by the pipeline: commands and queries, their
//! handlers, the repository and the domain events it raises.

pub mod commands;
pub mod events;
pub mod model;
pub mod queries;
pub mod repository;

use std::sync::Arc;

use crate::cache::{CacheKey, Codec};
use crate::pipeline::DispatcherBuilder;

pub use commands::{
    CompleteTodo, CompleteTodoHandler, CreateTodo, CreateTodoHandler, DeleteTodo,
    DeleteTodoHandler,
};
pub use events::{TodoAuditLog, TodoCompleted, TodoCreated, TodoDeleted};
pub use model::{Todo, TodoId, TodoPage, TodoResponse};
pub use queries::{GetTodo, GetTodoHandler, ListTodos, ListTodosHandler};
pub use repository::{InMemoryTodoRepository, TodoRepository};

/// Cache namespace and feature tag of every todo entry.
pub const FEATURE: &str = "todos";

pub fn todo_key(id: TodoId) -> CacheKey {
    CacheKey::of(FEATURE, id)
}

pub fn list_key(page: u32, page_size: u32) -> CacheKey {
    CacheKey::of(FEATURE, format!("list:{}:{}", page, page_size))
}

// == Wiring ==
/// Registers every todo handler and the audit log subscriber.
pub fn register<C: Codec>(
    builder: DispatcherBuilder<C>,
    repository: Arc<dyn TodoRepository>,
) -> DispatcherBuilder<C> {
    builder
        .register::<CreateTodo, _>(CreateTodoHandler::new(Arc::clone(&repository)))
        .register::<CompleteTodo, _>(CompleteTodoHandler::new(Arc::clone(&repository)))
        .register::<DeleteTodo, _>(DeleteTodoHandler::new(Arc::clone(&repository)))
        .register::<GetTodo, _>(GetTodoHandler::new(Arc::clone(&repository)))
        .register::<ListTodos, _>(ListTodosHandler::new(repository))
        .subscribe::<TodoCreated, _>(TodoAuditLog)
        .subscribe::<TodoCompleted, _>(TodoAuditLog)
        .subscribe::<TodoDeleted, _>(TodoAuditLog)
}
