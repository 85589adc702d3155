//! Record Pipeline - a todo service built on a typed request dispatcher
//!
//! Every command and query goes through the same behavior chain (logging,
//! validation, cache-aside) before reaching its handler. Cached responses
//! are framed with a compression marker and indexed by feature tag for bulk
//! invalidation.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod tasks;
pub mod todos;

pub use api::AppState;
pub use config::Config;
pub use error::{AppError, AppResult, ErrorKind, SuccessType};
pub use pipeline::{Dispatcher, DispatcherBuilder};
pub use tasks::spawn_cleanup_task;
