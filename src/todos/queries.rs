//! Todo queries. Both are served through the read-through cache.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use validator::{Validate, ValidationErrors};

use crate::cache::CachePolicy;
use crate::error::AppResult;
use crate::pipeline::{Handler, Request, RequestKind};
use crate::todos::model::{not_found, TodoId, TodoPage, TodoResponse};
use crate::todos::repository::TodoRepository;
use crate::todos::{list_key, todo_key};

/// Bumped whenever `TodoResponse` or `TodoPage` changes shape.
pub const TODO_SCHEMA_VERSION: u32 = 1;

/// Lists change on every create, so they live shorter than single todos.
pub const LIST_TTL: Duration = Duration::from_secs(60);

pub const DEFAULT_PAGE_SIZE: u32 = 20;

// == Get ==
#[derive(Debug, Clone, Copy, Validate)]
pub struct GetTodo {
    #[validate(range(min = 1, code = "Todo.IdRequired", message = "id must be positive"))]
    pub id: TodoId,
}

impl Request for GetTodo {
    type Response = TodoResponse;
    const NAME: &'static str = "GetTodo";
    const KIND: RequestKind = RequestKind::Query;

    fn validate(&self) -> Result<(), ValidationErrors> {
        Validate::validate(self)
    }

    fn cache_policy(&self) -> Option<CachePolicy> {
        // Zero ttl: the configured default applies
        Some(
            CachePolicy::new(todo_key(self.id), Duration::ZERO)
                .schema_version(TODO_SCHEMA_VERSION)
                .compression(false),
        )
    }
}

pub struct GetTodoHandler {
    repository: Arc<dyn TodoRepository>,
}

impl GetTodoHandler {
    pub fn new(repository: Arc<dyn TodoRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl Handler<GetTodo> for GetTodoHandler {
    async fn handle(&self, request: GetTodo, _token: &CancellationToken) -> AppResult<TodoResponse> {
        self.repository
            .find(request.id)
            .await?
            .map(TodoResponse::from)
            .ok_or_else(|| not_found(request.id))
    }
}

// == List ==
#[derive(Debug, Clone, Copy, Deserialize, Validate)]
pub struct ListTodos {
    #[serde(default = "first_page")]
    #[validate(range(min = 1, code = "Todo.PageRange", message = "page starts at 1"))]
    pub page: u32,
    #[serde(default = "default_page_size")]
    #[validate(range(
        min = 1,
        max = 100,
        code = "Todo.PageSizeRange",
        message = "page_size must be between 1 and 100"
    ))]
    pub page_size: u32,
}

fn first_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl Default for ListTodos {
    fn default() -> Self {
        Self {
            page: first_page(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Request for ListTodos {
    type Response = TodoPage;
    const NAME: &'static str = "ListTodos";
    const KIND: RequestKind = RequestKind::Query;

    fn validate(&self) -> Result<(), ValidationErrors> {
        Validate::validate(self)
    }

    fn cache_policy(&self) -> Option<CachePolicy> {
        Some(
            CachePolicy::new(list_key(self.page, self.page_size), LIST_TTL)
                .schema_version(TODO_SCHEMA_VERSION),
        )
    }
}

pub struct ListTodosHandler {
    repository: Arc<dyn TodoRepository>,
}

impl ListTodosHandler {
    pub fn new(repository: Arc<dyn TodoRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl Handler<ListTodos> for ListTodosHandler {
    async fn handle(&self, request: ListTodos, _token: &CancellationToken) -> AppResult<TodoPage> {
        let (items, total) = self
            .repository
            .list(request.page, request.page_size)
            .await?;
        Ok(TodoPage {
            items: items.into_iter().map(TodoResponse::from).collect(),
            page: request.page,
            page_size: request.page_size,
            total,
        })
    }
}
