//! API Module
//!
//! HTTP handlers and routing for the todo REST API.
//!
//! # Endpoints
//! - `POST /todos`, `GET /todos` - Create and list todos
//! - `GET /todos/:id`, `DELETE /todos/:id` - Fetch or delete one todo
//! - `PUT /todos/:id/complete` - Complete a todo
//! - `GET /stats` - Cache and pipeline statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
