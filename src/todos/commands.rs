//! Todo commands and their handlers.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use validator::{Validate, ValidationErrors};

use crate::cache::{CacheInvalidation, FeatureTag};
use crate::error::{AppError, AppResult, SuccessType};
use crate::pipeline::{Handler, Request, RequestKind};
use crate::todos::model::{not_found, TodoId};
use crate::todos::repository::TodoRepository;
use crate::todos::{todo_key, FEATURE};

// == Create ==
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateTodo {
    #[validate(length(
        min = 1,
        max = 200,
        code = "Todo.TitleLength",
        message = "title must be between 1 and 200 characters"
    ))]
    pub title: String,
    #[validate(length(
        max = 1000,
        code = "Todo.DescriptionLength",
        message = "description must be at most 1000 characters"
    ))]
    pub description: Option<String>,
    #[validate(range(
        min = 1,
        max = 5,
        code = "Todo.PriorityRange",
        message = "priority must be between 1 and 5"
    ))]
    pub priority: u8,
}

impl Request for CreateTodo {
    type Response = TodoId;
    const NAME: &'static str = "CreateTodo";
    const KIND: RequestKind = RequestKind::Command;

    fn validate(&self) -> Result<(), ValidationErrors> {
        Validate::validate(self)
    }

    fn invalidation(&self) -> Option<CacheInvalidation> {
        Some(CacheInvalidation::new().tag(FeatureTag::of(FEATURE)))
    }
}

pub struct CreateTodoHandler {
    repository: Arc<dyn TodoRepository>,
}

impl CreateTodoHandler {
    pub fn new(repository: Arc<dyn TodoRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl Handler<CreateTodo> for CreateTodoHandler {
    async fn handle(&self, request: CreateTodo, _token: &CancellationToken) -> AppResult<TodoId> {
        let description = request
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        let todo = self
            .repository
            .add(request.title.trim().to_string(), description, request.priority)
            .await?;
        Ok(todo.id)
    }
}

// == Complete ==
#[derive(Debug, Clone, Copy, Validate)]
pub struct CompleteTodo {
    #[validate(range(min = 1, code = "Todo.IdRequired", message = "id must be positive"))]
    pub id: TodoId,
}

impl Request for CompleteTodo {
    type Response = SuccessType;
    const NAME: &'static str = "CompleteTodo";
    const KIND: RequestKind = RequestKind::Command;

    fn validate(&self) -> Result<(), ValidationErrors> {
        Validate::validate(self)
    }

    fn invalidation(&self) -> Option<CacheInvalidation> {
        Some(
            CacheInvalidation::new()
                .key(todo_key(self.id))
                .tag(FeatureTag::of(FEATURE)),
        )
    }
}

pub struct CompleteTodoHandler {
    repository: Arc<dyn TodoRepository>,
}

impl CompleteTodoHandler {
    pub fn new(repository: Arc<dyn TodoRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl Handler<CompleteTodo> for CompleteTodoHandler {
    async fn handle(&self, request: CompleteTodo, token: &CancellationToken) -> AppResult<SuccessType> {
        let mut todo = self
            .repository
            .find(request.id)
            .await?
            .ok_or_else(|| not_found(request.id))?;
        todo.complete(Utc::now())?;

        if token.is_cancelled() {
            return Err(AppError::cancelled());
        }
        self.repository.save(todo).await?;
        Ok(SuccessType::NoContent)
    }
}

// == Delete ==
#[derive(Debug, Clone, Copy, Validate)]
pub struct DeleteTodo {
    #[validate(range(min = 1, code = "Todo.IdRequired", message = "id must be positive"))]
    pub id: TodoId,
}

impl Request for DeleteTodo {
    type Response = SuccessType;
    const NAME: &'static str = "DeleteTodo";
    const KIND: RequestKind = RequestKind::Command;

    fn validate(&self) -> Result<(), ValidationErrors> {
        Validate::validate(self)
    }

    fn invalidation(&self) -> Option<CacheInvalidation> {
        Some(
            CacheInvalidation::new()
                .key(todo_key(self.id))
                .tag(FeatureTag::of(FEATURE)),
        )
    }
}

pub struct DeleteTodoHandler {
    repository: Arc<dyn TodoRepository>,
}

impl DeleteTodoHandler {
    pub fn new(repository: Arc<dyn TodoRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl Handler<DeleteTodo> for DeleteTodoHandler {
    async fn handle(&self, request: DeleteTodo, _token: &CancellationToken) -> AppResult<SuccessType> {
        if self.repository.remove(request.id).await? {
            Ok(SuccessType::NoContent)
        } else {
            Err(not_found(request.id))
        }
    }
}
