use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::error::AppError;
use crate::models::todo::{next_todo_id, sort_newest_first};
use crate::models::{FieldUpdate, Todo, TodoListField, UserDocument, UserId};
use crate::store::DocumentStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    Idle,
    Loading,
    Ready,
}

/// Result of a mutation as seen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Written to the store and adopted in memory.
    Applied,
    /// Nothing to do: blank text or no user.
    Skipped,
    /// The store write failed; the in-memory list is unchanged.
    Failed,
}

/// In-memory todo list for one user, kept in step with the user's document.
///
/// Every mutation computes the next list, overwrites `todolist` in the store
/// with the whole list, and adopts the next list only once that write succeeds.
pub struct TodoStore {
    store: Arc<dyn DocumentStore>,
    todos: Vec<Todo>,
    status: LoadStatus,
}

impl TodoStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            todos: Vec::new(),
            status: LoadStatus::Idle,
        }
    }

    pub fn todos(&self) -> &[Todo] {
        &self.todos
    }

    pub fn status(&self) -> LoadStatus {
        self.status
    }

    /// Always ends in `Ready`. On failure the previous list is kept.
    pub async fn load(&mut self, user: &UserId) {
        let store = self.begin_load();
        let fetched = Self::fetch(store.as_ref(), user).await;
        self.finish_load(user, fetched);
    }

    /// Marks the list as loading and hands out the store so the read can run
    /// without borrowing this list.
    pub fn begin_load(&mut self) -> Arc<dyn DocumentStore> {
        self.status = LoadStatus::Loading;
        self.store.clone()
    }

    pub fn finish_load(&mut self, user: &UserId, fetched: Result<Vec<Todo>, AppError>) {
        match fetched {
            Ok(todos) => self.todos = todos,
            Err(e) => error!("Error checking/loading todos for {}: {}", user, e),
        }
        self.status = LoadStatus::Ready;
    }

    /// Reads the user's list, creating the empty document on first use.
    pub async fn fetch(store: &dyn DocumentStore, user: &UserId) -> Result<Vec<Todo>, AppError> {
        match store.load_document(user).await? {
            Some(document) => {
                let mut todos = document.decode_todos();
                sort_newest_first(&mut todos);
                info!("Loaded {} todos for {}", todos.len(), user);
                Ok(todos)
            }
            None => {
                store
                    .create_document(user, &UserDocument::fresh(Utc::now()))
                    .await?;
                info!("Created empty todo document for {}", user);
                Ok(Vec::new())
            }
        }
    }

    pub async fn add(&mut self, user: Option<&UserId>, text: &str) -> Outcome {
        let text = text.trim();
        let Some(user) = user else {
            return Outcome::Skipped;
        };
        if text.is_empty() {
            return Outcome::Skipped;
        }

        let now = Utc::now();
        let todo = Todo::new(next_todo_id(&self.todos, now), text, now);
        let mut next = Vec::with_capacity(self.todos.len() + 1);
        next.push(todo);
        next.extend(self.todos.iter().cloned());

        self.commit(user, next, "adding").await
    }

    pub async fn edit(&mut self, user: Option<&UserId>, id: &str, new_text: &str) -> Outcome {
        let new_text = new_text.trim();
        let Some(user) = user else {
            return Outcome::Skipped;
        };
        if new_text.is_empty() {
            return Outcome::Skipped;
        }

        let next = self
            .todos
            .iter()
            .map(|t| {
                if t.id == id {
                    Todo { text: new_text.to_string(), ..t.clone() }
                } else {
                    t.clone()
                }
            })
            .collect();

        self.commit(user, next, "updating").await
    }

    pub async fn toggle_complete(&mut self, user: Option<&UserId>, id: &str) -> Outcome {
        let Some(user) = user else {
            return Outcome::Skipped;
        };

        let next = self
            .todos
            .iter()
            .map(|t| {
                if t.id == id {
                    Todo { completed: !t.completed, ..t.clone() }
                } else {
                    t.clone()
                }
            })
            .collect();

        self.commit(user, next, "toggling").await
    }

    pub async fn delete(&mut self, user: Option<&UserId>, id: &str) -> Outcome {
        let Some(user) = user else {
            return Outcome::Skipped;
        };

        let next = self.todos.iter().filter(|t| t.id != id).cloned().collect();

        self.commit(user, next, "deleting").await
    }

    async fn commit(&mut self, user: &UserId, next: Vec<Todo>, action: &str) -> Outcome {
        let update = FieldUpdate::Todolist(TodoListField::encode(&next, Utc::now()));
        match self.store.replace_field(user, &update).await {
            Ok(()) => {
                debug!("Persisted {} todos for {} after {}", next.len(), user, action);
                self.todos = next;
                Outcome::Applied
            }
            Err(e) => {
                error!("Error {} todo for {}: {}", action, user, e);
                Outcome::Failed
            }
        }
    }
}
