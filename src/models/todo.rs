use std::cmp::Reverse;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: String,
    pub text: String,
    pub completed: bool,
    pub created_at: Option<DateTime<Utc>>,
}

impl Todo {
    pub fn new(id: String, text: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            text: text.into(),
            completed: false,
            created_at: Some(created_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTodoRequest {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateTodoRequest {
    pub text: String,
}

/// Creation-time id: epoch milliseconds, bumped past any id already taken.
pub fn next_todo_id(existing: &[Todo], now: DateTime<Utc>) -> String {
    let mut millis = now.timestamp_millis();
    loop {
        let candidate = millis.to_string();
        if !existing.iter().any(|t| t.id == candidate) {
            return candidate;
        }
        millis += 1;
    }
}

/// Newest first. Items without `created_at` sink to the end; ties keep their order.
pub fn sort_newest_first(todos: &mut [Todo]) {
    todos.sort_by_key(|t| Reverse(t.created_at));
}
