//! Request DTOs for the todo API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;

use crate::todos::CreateTodo;

/// Priority used when the body does not specify one
pub const DEFAULT_PRIORITY: u8 = 3;

fn default_priority() -> u8 {
    DEFAULT_PRIORITY
}

/// Request body for POST /todos
///
/// Field rules are checked by the pipeline, not here.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTodoBody {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: u8,
}

impl From<CreateTodoBody> for CreateTodo {
    fn from(body: CreateTodoBody) -> Self {
        CreateTodo {
            title: body.title,
            description: body.description,
            priority: body.priority,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_body_defaults() {
        let body: CreateTodoBody = serde_json::from_str(r#"{"title": "Buy milk"}"#).unwrap();
        assert_eq!(body.title, "Buy milk");
        assert!(body.description.is_none());
        assert_eq!(body.priority, DEFAULT_PRIORITY);
    }

    #[test]
    fn test_create_body_into_command() {
        let json = r#"{"title": "Ship", "description": "v1", "priority": 5}"#;
        let command = CreateTodo::from(serde_json::from_str::<CreateTodoBody>(json).unwrap());
        assert_eq!(command.title, "Ship");
        assert_eq!(command.description.as_deref(), Some("v1"));
        assert_eq!(command.priority, 5);
    }
}
