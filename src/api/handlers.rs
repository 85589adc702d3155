//! API Handlers
//!
//! HTTP handlers for the todo endpoints. Each one turns the HTTP input into
//! a typed request and sends it through the dispatcher.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};

use crate::cache::{BincodeCodec, CacheSerializer, CacheStore, JsonCodec, MemoryCacheStore};
use crate::config::{CodecKind, Config};
use crate::error::{AppResult, SuccessType};
use crate::models::{CreateTodoBody, CreatedResponse, HealthResponse, StatsResponse};
use crate::pipeline::{CacheSettings, Dispatcher, DispatcherBuilder, EventBus, RegistrationError};
use crate::todos::{
    self, CompleteTodo, CreateTodo, DeleteTodo, GetTodo, InMemoryTodoRepository, ListTodos,
    TodoId, TodoPage, TodoRepository, TodoResponse,
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    /// Same store the caching behavior writes to, kept for stats and cleanup
    pub cache: MemoryCacheStore,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher, cache: MemoryCacheStore) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            cache,
        }
    }

    /// Wires the store, repository and dispatcher from configuration.
    pub fn from_config(config: &Config) -> Result<Self, RegistrationError> {
        let cache = MemoryCacheStore::new(config.max_entries);
        let events = EventBus::new();
        let repository: Arc<dyn TodoRepository> =
            Arc::new(InMemoryTodoRepository::new(events.clone()));

        let dispatcher = build_dispatcher(config, cache.clone(), events, repository)?;
        Ok(Self::new(dispatcher, cache))
    }
}

/// Builds the dispatcher with the codec selected in `config`.
pub fn build_dispatcher(
    config: &Config,
    cache: MemoryCacheStore,
    events: EventBus,
    repository: Arc<dyn TodoRepository>,
) -> Result<Dispatcher, RegistrationError> {
    let store: Arc<dyn CacheStore> = Arc::new(cache);
    let settings = CacheSettings::from(config);

    match config.cache_codec {
        CodecKind::Json => {
            let builder =
                DispatcherBuilder::new(store, CacheSerializer::new(JsonCodec), settings, events);
            todos::register(builder, repository).build()
        }
        CodecKind::Bincode => {
            let builder =
                DispatcherBuilder::new(store, CacheSerializer::new(BincodeCodec), settings, events);
            todos::register(builder, repository).build()
        }
    }
}

fn status_of(success: SuccessType) -> StatusCode {
    match success {
        SuccessType::Ok => StatusCode::OK,
        SuccessType::Created => StatusCode::CREATED,
        SuccessType::NoContent => StatusCode::NO_CONTENT,
    }
}

// Extractors are taken as `Result` so rejections surface as `AppError`.

/// Handler for POST /todos
pub async fn create_todo_handler(
    State(state): State<AppState>,
    body: Result<Json<CreateTodoBody>, JsonRejection>,
) -> AppResult<(StatusCode, Json<CreatedResponse>)> {
    let Json(body) = body?;
    let id = state.dispatcher.send(CreateTodo::from(body)).await?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

/// Handler for GET /todos?page=&page_size=
pub async fn list_todos_handler(
    State(state): State<AppState>,
    query: Result<Query<ListTodos>, QueryRejection>,
) -> AppResult<Json<TodoPage>> {
    let Query(query) = query?;
    let page = state.dispatcher.send(query).await?;
    Ok(Json(page))
}

/// Handler for GET /todos/:id
pub async fn get_todo_handler(
    State(state): State<AppState>,
    id: Result<Path<TodoId>, PathRejection>,
) -> AppResult<Json<TodoResponse>> {
    let Path(id) = id?;
    let todo = state.dispatcher.send(GetTodo { id }).await?;
    Ok(Json(todo))
}

/// Handler for PUT /todos/:id/complete
pub async fn complete_todo_handler(
    State(state): State<AppState>,
    id: Result<Path<TodoId>, PathRejection>,
) -> AppResult<StatusCode> {
    let Path(id) = id?;
    let success = state.dispatcher.send(CompleteTodo { id }).await?;
    Ok(status_of(success))
}

/// Handler for DELETE /todos/:id
pub async fn delete_todo_handler(
    State(state): State<AppState>,
    id: Result<Path<TodoId>, PathRejection>,
) -> AppResult<StatusCode> {
    let Path(id) = id?;
    let success = state.dispatcher.send(DeleteTodo { id }).await?;
    Ok(status_of(success))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let cache = state.cache.stats().await;
    Json(StatsResponse::new(cache, state.dispatcher.metrics()))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn test_state() -> AppState {
        AppState::from_config(&Config::default()).unwrap()
    }

    fn body(title: &str) -> CreateTodoBody {
        CreateTodoBody {
            title: title.to_string(),
            description: None,
            priority: 2,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_handler() {
        let state = test_state();

        let (status, created) = create_todo_handler(State(state.clone()), Ok(Json(body("Buy milk"))))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let todo = get_todo_handler(State(state), Ok(Path(created.id))).await.unwrap();
        assert_eq!(todo.title, "Buy milk");
        assert!(!todo.is_completed);
    }

    #[tokio::test]
    async fn test_get_missing_todo() {
        let state = test_state();

        let err = get_todo_handler(State(state), Ok(Path(99))).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_complete_then_conflict() {
        let state = test_state();
        let (_, created) = create_todo_handler(State(state.clone()), Ok(Json(body("Ship"))))
            .await
            .unwrap();

        let status = complete_todo_handler(State(state.clone()), Ok(Path(created.id)))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);

        let err = complete_todo_handler(State(state), Ok(Path(created.id)))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_invalid_title_rejected() {
        let state = test_state();

        let err = create_todo_handler(State(state.clone()), Ok(Json(body(""))))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(err.code, "Todo.TitleLength");

        let page = list_todos_handler(State(state), Ok(Query(ListTodos::default())))
            .await
            .unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn test_stats_handler() {
        let state = test_state();

        let response = stats_handler(State(state)).await;
        assert_eq!(response.cache.hits, 0);
        assert_eq!(response.pipeline.requests, 0);
    }

    #[tokio::test]
    async fn test_bincode_codec_serves_cached_reads() {
        let config = Config {
            cache_codec: CodecKind::Bincode,
            ..Config::default()
        };
        let state = AppState::from_config(&config).unwrap();
        let (_, created) = create_todo_handler(State(state.clone()), Ok(Json(body("Bin"))))
            .await
            .unwrap();

        let first = get_todo_handler(State(state.clone()), Ok(Path(created.id))).await.unwrap();
        let second = get_todo_handler(State(state.clone()), Ok(Path(created.id))).await.unwrap();
        assert_eq!(first.0, second.0);
        assert_eq!(state.dispatcher.metrics().cache_hits, 1);
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler().await;
        assert_eq!(response.status, "healthy");
    }
}
