//! API Routes
//!
//! Configures the Axum router with all todo endpoints.

use axum::{
    routing::{get, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    complete_todo_handler, create_todo_handler, delete_todo_handler, get_todo_handler,
    health_handler, list_todos_handler, stats_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `POST /todos` - Create a todo
/// - `GET /todos` - List todos, paginated with `page` and `page_size`
/// - `GET /todos/:id` - Fetch one todo
/// - `PUT /todos/:id/complete` - Mark a todo completed
/// - `DELETE /todos/:id` - Delete a todo
/// - `GET /stats` - Cache and pipeline statistics
/// - `GET /health` - Health check endpoint
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/todos", get(list_todos_handler).post(create_todo_handler))
        .route(
            "/todos/:id",
            get(get_todo_handler).delete(delete_todo_handler),
        )
        .route("/todos/:id/complete", put(complete_todo_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
