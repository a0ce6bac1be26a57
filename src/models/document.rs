use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::models::Todo;

pub const TODOLIST_FIELD: &str = "todolist";
pub const EXPIRY_DAYS: i64 = 7;

/// Store-native timestamp. Reads accept either this object form or an RFC 3339 string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreTimestamp {
    pub seconds: i64,
    pub nanoseconds: u32,
}

impl StoreTimestamp {
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.seconds, self.nanoseconds)
    }
}

impl From<DateTime<Utc>> for StoreTimestamp {
    fn from(ts: DateTime<Utc>) -> Self {
        Self {
            seconds: ts.timestamp(),
            nanoseconds: ts.timestamp_subsec_nanos(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TimestampRepr {
    Store { seconds: i64, nanoseconds: u32 },
    Native(DateTime<Utc>),
}

impl<'de> Deserialize<'de> for StoreTimestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match TimestampRepr::deserialize(deserializer)? {
            TimestampRepr::Store { seconds, nanoseconds } => StoreTimestamp { seconds, nanoseconds },
            TimestampRepr::Native(ts) => ts.into(),
        })
    }
}

/// Wire shape of a single todo inside the user document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredTodo {
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<StoreTimestamp>,
}

impl StoredTodo {
    /// `fallback` stands in for a missing creation time.
    pub fn encode(todo: &Todo, fallback: DateTime<Utc>) -> Self {
        Self {
            id: todo.id.clone(),
            text: todo.text.clone(),
            completed: todo.completed,
            created_at: Some(todo.created_at.unwrap_or(fallback).into()),
        }
    }

    pub fn decode(self) -> Todo {
        Todo {
            id: self.id,
            text: self.text,
            completed: self.completed,
            created_at: self.created_at.and_then(StoreTimestamp::to_datetime),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TodoListField {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub todos: Option<Vec<StoredTodo>>,
}

impl TodoListField {
    pub fn empty() -> Self {
        Self { todos: Some(Vec::new()) }
    }

    pub fn encode(todos: &[Todo], now: DateTime<Utc>) -> Self {
        Self {
            todos: Some(todos.iter().map(|t| StoredTodo::encode(t, now)).collect()),
        }
    }
}

/// Per-user document: `{ todolist: { todos }, expireAt }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub todolist: Option<TodoListField>,
    /// Documents written before the list was namespaced under `todolist`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub todos: Option<Vec<StoredTodo>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_at: Option<StoreTimestamp>,
}

impl UserDocument {
    pub fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            todolist: Some(TodoListField::empty()),
            todos: None,
            expire_at: Some((now + Duration::days(EXPIRY_DAYS)).into()),
        }
    }

    pub fn stored_todos(&self) -> &[StoredTodo] {
        self.todolist
            .as_ref()
            .and_then(|list| list.todos.as_deref())
            .or(self.todos.as_deref())
            .unwrap_or(&[])
    }

    pub fn decode_todos(&self) -> Vec<Todo> {
        self.stored_todos().iter().cloned().map(StoredTodo::decode).collect()
    }
}

/// Single-field overwrite applied to an existing user document.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    Todolist(TodoListField),
}

impl FieldUpdate {
    pub fn field(&self) -> &'static str {
        match self {
            FieldUpdate::Todolist(_) => TODOLIST_FIELD,
        }
    }

    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            FieldUpdate::Todolist(list) => serde_json::to_value(list),
        }
    }
}
