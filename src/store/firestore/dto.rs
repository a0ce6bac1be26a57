use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{StoreTimestamp, StoredTodo, TodoListField, UserDocument};

/// Firestore typed value as it appears in REST payloads, e.g. `{"stringValue": "x"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Value {
    NullValue(Option<String>),
    BooleanValue(bool),
    IntegerValue(String),
    DoubleValue(f64),
    TimestampValue(String),
    StringValue(String),
    BytesValue(String),
    ReferenceValue(String),
    GeoPointValue(serde_json::Value),
    ArrayValue(ArrayValue),
    MapValue(MapValue),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArrayValue {
    #[serde(default)]
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapValue {
    #[serde(default)]
    pub fields: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub fields: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: String,
}

pub fn encode_timestamp(ts: StoreTimestamp) -> Value {
    match ts.to_datetime() {
        Some(dt) => Value::TimestampValue(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        None => Value::NullValue(None),
    }
}

/// Accepts `timestampValue` as well as a `{seconds, nanoseconds}` map written by other clients.
pub fn decode_timestamp(value: &Value) -> Option<StoreTimestamp> {
    match value {
        Value::TimestampValue(raw) => DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc).into()),
        Value::MapValue(map) => {
            let seconds = integer_field(&map.fields, "seconds")?;
            let nanoseconds = integer_field(&map.fields, "nanoseconds").unwrap_or(0);
            Some(StoreTimestamp {
                seconds,
                nanoseconds: u32::try_from(nanoseconds).ok()?,
            })
        }
        _ => None,
    }
}

fn integer_field(fields: &HashMap<String, Value>, key: &str) -> Option<i64> {
    match fields.get(key)? {
        Value::IntegerValue(raw) => raw.parse().ok(),
        Value::DoubleValue(n) => Some(*n as i64),
        _ => None,
    }
}

fn string_field(fields: &HashMap<String, Value>, key: &str) -> Option<String> {
    match fields.get(key)? {
        Value::StringValue(s) => Some(s.clone()),
        Value::IntegerValue(raw) => Some(raw.clone()),
        _ => None,
    }
}

fn bool_field(fields: &HashMap<String, Value>, key: &str) -> Option<bool> {
    match fields.get(key)? {
        Value::BooleanValue(b) => Some(*b),
        _ => None,
    }
}

pub fn encode_todo(todo: &StoredTodo) -> Value {
    let mut fields = HashMap::new();
    fields.insert("id".to_string(), Value::StringValue(todo.id.clone()));
    fields.insert("text".to_string(), Value::StringValue(todo.text.clone()));
    fields.insert("completed".to_string(), Value::BooleanValue(todo.completed));
    if let Some(created_at) = todo.created_at {
        fields.insert("createdAt".to_string(), encode_timestamp(created_at));
    }
    Value::MapValue(MapValue { fields })
}

pub fn decode_todo(value: &Value) -> Option<StoredTodo> {
    let Value::MapValue(map) = value else {
        return None;
    };
    Some(StoredTodo {
        id: string_field(&map.fields, "id")?,
        text: string_field(&map.fields, "text").unwrap_or_default(),
        completed: bool_field(&map.fields, "completed").unwrap_or(false),
        created_at: map.fields.get("createdAt").and_then(decode_timestamp),
    })
}

fn encode_todo_array(todos: &[StoredTodo]) -> Value {
    Value::ArrayValue(ArrayValue {
        values: todos.iter().map(encode_todo).collect(),
    })
}

fn decode_todo_array(value: &Value) -> Option<Vec<StoredTodo>> {
    match value {
        Value::ArrayValue(array) => Some(
            array
                .values
                .iter()
                .filter_map(|v| {
                    let decoded = decode_todo(v);
                    if decoded.is_none() {
                        tracing::warn!("Skipping malformed todo entry: {:?}", v);
                    }
                    decoded
                })
                .collect(),
        ),
        _ => None,
    }
}

pub fn encode_todolist(list: &TodoListField) -> Value {
    let mut fields = HashMap::new();
    if let Some(todos) = &list.todos {
        fields.insert("todos".to_string(), encode_todo_array(todos));
    }
    Value::MapValue(MapValue { fields })
}

pub fn encode_document(document: &UserDocument) -> Document {
    let mut fields = HashMap::new();
    if let Some(list) = &document.todolist {
        fields.insert("todolist".to_string(), encode_todolist(list));
    }
    if let Some(todos) = &document.todos {
        fields.insert("todos".to_string(), encode_todo_array(todos));
    }
    if let Some(expire_at) = document.expire_at {
        fields.insert("expireAt".to_string(), encode_timestamp(expire_at));
    }
    Document {
        fields,
        ..Document::default()
    }
}

pub fn decode_document(document: &Document) -> UserDocument {
    let todolist = match document.fields.get("todolist") {
        Some(Value::MapValue(map)) => Some(TodoListField {
            todos: map.fields.get("todos").and_then(decode_todo_array),
        }),
        _ => None,
    };

    UserDocument {
        todolist,
        todos: document.fields.get("todos").and_then(decode_todo_array),
        expire_at: document.fields.get("expireAt").and_then(decode_timestamp),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    use crate::models::Todo;

    #[test]
    fn test_decode_rest_document() {
        let raw = json!({
            "name": "projects/p/databases/(default)/documents/users/u1",
            "fields": {
                "todolist": { "mapValue": { "fields": {
                    "todos": { "arrayValue": { "values": [
                        { "mapValue": { "fields": {
                            "id": { "stringValue": "1767225600000" },
                            "text": { "stringValue": "buy milk" },
                            "completed": { "booleanValue": true },
                            "createdAt": { "timestampValue": "2026-01-01T00:00:00.500Z" }
                        }}}
                    ]}}
                }}},
                "expireAt": { "timestampValue": "2026-01-08T00:00:00Z" }
            },
            "createTime": "2026-01-01T00:00:00.000001Z",
            "updateTime": "2026-01-01T00:00:00.000001Z"
        });

        let document: Document = serde_json::from_value(raw).unwrap();
        let decoded = decode_document(&document);
        let todos = decoded.decode_todos();

        assert_eq!(todos.len(), 1);
        assert_eq!(todos[0].id, "1767225600000");
        assert_eq!(todos[0].text, "buy milk");
        assert!(todos[0].completed);
        assert_eq!(
            todos[0].created_at,
            Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::milliseconds(500))
        );
        assert!(decoded.expire_at.is_some());
    }

    #[test]
    fn test_map_timestamp_decodes_like_timestamp_value() {
        let as_value = Value::TimestampValue("2026-01-01T00:00:01Z".to_string());
        let mut fields = HashMap::new();
        fields.insert("seconds".to_string(), Value::IntegerValue("1767225601".to_string()));
        fields.insert("nanoseconds".to_string(), Value::IntegerValue("0".to_string()));
        let as_map = Value::MapValue(MapValue { fields });

        assert_eq!(decode_timestamp(&as_value), decode_timestamp(&as_map));
        assert!(decode_timestamp(&as_value).is_some());
    }

    #[test]
    fn test_encode_then_decode_keeps_todo_fields() {
        let created = Utc.with_ymd_and_hms(2026, 1, 1, 8, 30, 0).unwrap() + chrono::Duration::microseconds(123_456);
        let mut todo = Todo::new("7".to_string(), "walk the dog", created);
        todo.completed = true;
        let doc = UserDocument {
            todolist: Some(TodoListField::encode(&[todo.clone()], created)),
            todos: None,
            expire_at: None,
        };

        let wire = serde_json::to_value(encode_document(&doc)).unwrap();
        let back: Document = serde_json::from_value(wire).unwrap();

        assert_eq!(decode_document(&back).decode_todos(), vec![todo]);
    }

    #[test]
    fn test_typed_value_wire_format() {
        let value = encode_todo(&StoredTodo {
            id: "1".to_string(),
            text: "x".to_string(),
            completed: false,
            created_at: None,
        });

        assert_eq!(
            serde_json::to_value(value).unwrap(),
            json!({ "mapValue": { "fields": {
                "id": { "stringValue": "1" },
                "text": { "stringValue": "x" },
                "completed": { "booleanValue": false }
            }}})
        );
    }

    #[test]
    fn test_legacy_top_level_array_decodes() {
        let raw = json!({
            "fields": {
                "todos": { "arrayValue": { "values": [
                    { "mapValue": { "fields": {
                        "id": { "stringValue": "1" },
                        "text": { "stringValue": "old" },
                        "completed": { "booleanValue": false }
                    }}}
                ]}}
            }
        });

        let document: Document = serde_json::from_value(raw).unwrap();
        let todos = decode_document(&document).decode_todos();
        assert_eq!(todos.len(), 1);
        assert_eq!(todos[0].text, "old");
    }
}
