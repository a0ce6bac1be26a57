use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::info;

use crate::error::AppError;
use crate::identity::Identity;
use crate::models::{Todo, UserId};
use crate::services::todo_store::{LoadStatus, Outcome, TodoStore};
use crate::store::DocumentStore;

pub type SharedSession = Arc<Mutex<Session>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    Pending,
    Ready,
    Unavailable,
}

/// What the list surface renders.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub loading: bool,
    pub auth: AuthState,
    pub user_id: Option<String>,
    pub todos: Vec<Todo>,
    pub last_write_failed: bool,
}

/// The identity this process is signed in as and the todo list bound to it.
///
/// `epoch` changes on every reset so a bootstrap started for an older session
/// cannot attach to a newer one.
pub struct Session {
    epoch: u64,
    auth: AuthState,
    identity: Option<Identity>,
    todos: Option<TodoStore>,
    last_write_failed: bool,
}

impl Session {
    pub fn pending(epoch: u64) -> Self {
        Self {
            epoch,
            auth: AuthState::Pending,
            identity: None,
            todos: None,
            last_write_failed: false,
        }
    }

    pub fn shared(epoch: u64) -> SharedSession {
        Arc::new(Mutex::new(Self::pending(epoch)))
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn auth(&self) -> AuthState {
        self.auth
    }

    pub fn user_id(&self) -> Option<&UserId> {
        self.identity.as_ref().map(|i| &i.user_id)
    }

    pub fn attach(&mut self, identity: Identity, store: Arc<dyn DocumentStore>) {
        self.identity = Some(identity);
        self.todos = Some(TodoStore::new(store));
        self.auth = AuthState::Ready;
        self.last_write_failed = false;
    }

    pub fn mark_unavailable(&mut self) {
        self.auth = AuthState::Unavailable;
    }

    /// Replaces this session with a fresh pending one and returns the new epoch.
    pub fn reset(&mut self) -> u64 {
        let epoch = self.epoch + 1;
        *self = Self::pending(epoch);
        epoch
    }

    /// Flips the list to loading. The returned handle reads the store without
    /// holding the session.
    pub fn begin_load(&mut self) -> Option<PendingLoad> {
        let user = self.identity.as_ref()?.user_id.clone();
        let store = self.todos.as_mut()?.begin_load();
        Some(PendingLoad {
            epoch: self.epoch,
            user,
            store,
        })
    }

    /// Adopts a finished read. Returns false when the session was reset in
    /// the meantime and the read was dropped.
    pub fn finish_load(&mut self, pending: PendingLoad, fetched: Result<Vec<Todo>, AppError>) -> bool {
        if pending.epoch != self.epoch {
            return false;
        }
        match self.todos.as_mut() {
            Some(todos) => {
                todos.finish_load(&pending.user, fetched);
                true
            }
            None => false,
        }
    }

    /// The bound list, once it has finished loading.
    fn ready_list(&mut self) -> Option<(&UserId, &mut TodoStore)> {
        let user = &self.identity.as_ref()?.user_id;
        let todos = self.todos.as_mut()?;
        (todos.status() == LoadStatus::Ready).then_some((user, todos))
    }

    pub async fn add(&mut self, text: &str) -> Outcome {
        let outcome = match self.ready_list() {
            Some((user, todos)) => todos.add(Some(user), text).await,
            None => Outcome::Skipped,
        };
        self.record(outcome)
    }

    /// Completed todos are read-only on this surface.
    pub async fn edit(&mut self, id: &str, text: &str) -> Outcome {
        let outcome = match self.ready_list() {
            Some((_, todos)) if todos.todos().iter().any(|t| t.id == id && t.completed) => {
                Outcome::Skipped
            }
            Some((user, todos)) => todos.edit(Some(user), id, text).await,
            None => Outcome::Skipped,
        };
        self.record(outcome)
    }

    pub async fn toggle_complete(&mut self, id: &str) -> Outcome {
        let outcome = match self.ready_list() {
            Some((user, todos)) => todos.toggle_complete(Some(user), id).await,
            None => Outcome::Skipped,
        };
        self.record(outcome)
    }

    pub async fn delete(&mut self, id: &str) -> Outcome {
        let outcome = match self.ready_list() {
            Some((user, todos)) => todos.delete(Some(user), id).await,
            None => Outcome::Skipped,
        };
        self.record(outcome)
    }

    fn record(&mut self, outcome: Outcome) -> Outcome {
        match outcome {
            Outcome::Applied => self.last_write_failed = false,
            Outcome::Failed => self.last_write_failed = true,
            Outcome::Skipped => {}
        }
        outcome
    }

    pub fn view(&self) -> SessionView {
        let status = self.todos.as_ref().map(TodoStore::status).unwrap_or(LoadStatus::Idle);
        SessionView {
            loading: self.auth != AuthState::Ready || status != LoadStatus::Ready,
            auth: self.auth,
            user_id: self.user_id().map(|u| u.to_string()),
            todos: self.todos.as_ref().map(|t| t.todos().to_vec()).unwrap_or_default(),
            last_write_failed: self.last_write_failed,
        }
    }
}

/// A list read started by [`Session::begin_load`].
pub struct PendingLoad {
    epoch: u64,
    user: UserId,
    store: Arc<dyn DocumentStore>,
}

impl PendingLoad {
    pub async fn fetch(&self) -> Result<Vec<Todo>, AppError> {
        TodoStore::fetch(self.store.as_ref(), &self.user).await
    }
}

/// Reloads the bound list. The session lock is released while the store is
/// read, so callers keep seeing the loading view in the meantime.
pub async fn reload(session: &SharedSession) {
    let pending = session.lock().await.begin_load();
    let Some(pending) = pending else {
        return;
    };
    let epoch = pending.epoch;
    let fetched = pending.fetch().await;
    if !session.lock().await.finish_load(pending, fetched) {
        info!("Session was reset while loading, discarding list for epoch {}", epoch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::Notify;

    use crate::models::{FieldUpdate, UserDocument};
    use crate::store::MemoryDocumentStore;

    /// Holds every read until the test opens the gate.
    struct GatedStore {
        inner: MemoryDocumentStore,
        entered: Notify,
        gate: Notify,
    }

    #[async_trait]
    impl DocumentStore for GatedStore {
        async fn load_document(&self, user: &UserId) -> Result<Option<UserDocument>, AppError> {
            self.entered.notify_one();
            self.gate.notified().await;
            self.inner.load_document(user).await
        }

        async fn create_document(&self, user: &UserId, document: &UserDocument) -> Result<(), AppError> {
            self.inner.create_document(user, document).await
        }

        async fn replace_field(&self, user: &UserId, update: &FieldUpdate) -> Result<(), AppError> {
            self.inner.replace_field(user, update).await
        }
    }

    async fn load(session: &mut Session) {
        let pending = session.begin_load().expect("Session has a list");
        let fetched = pending.fetch().await;
        assert!(session.finish_load(pending, fetched));
    }

    fn guest(id: &str) -> Identity {
        Identity {
            user_id: UserId::new(id),
            id_token: None,
        }
    }

    #[tokio::test]
    async fn test_pending_session_is_loading_and_ignores_mutations() {
        let mut session = Session::pending(0);

        assert_eq!(session.add("too early").await, Outcome::Skipped);
        let view = session.view();
        assert!(view.loading);
        assert_eq!(view.auth, AuthState::Pending);
        assert!(view.todos.is_empty());
    }

    #[tokio::test]
    async fn test_attached_session_is_ready_after_load() {
        let mut session = Session::pending(0);
        session.attach(guest("guest-1"), Arc::new(MemoryDocumentStore::new()));
        assert!(session.view().loading);

        load(&mut session).await;
        session.add("task").await;

        let view = session.view();
        assert!(!view.loading);
        assert_eq!(view.user_id.as_deref(), Some("guest-1"));
        assert_eq!(view.todos.len(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_identity_stays_loading() {
        let mut session = Session::pending(0);
        session.mark_unavailable();

        let view = session.view();
        assert!(view.loading);
        assert_eq!(view.auth, AuthState::Unavailable);
    }

    #[tokio::test]
    async fn test_write_failure_flag_clears_on_next_success() {
        let memory = Arc::new(MemoryDocumentStore::new());
        let mut session = Session::pending(0);
        session.attach(guest("guest-1"), memory.clone());
        load(&mut session).await;

        memory.set_fail_writes(true);
        assert_eq!(session.add("flaky").await, Outcome::Failed);
        assert!(session.view().last_write_failed);

        memory.set_fail_writes(false);
        assert_eq!(session.add("flaky").await, Outcome::Applied);
        assert!(!session.view().last_write_failed);
    }

    #[tokio::test]
    async fn test_reset_bumps_epoch_and_drops_identity() {
        let mut session = Session::pending(3);
        session.attach(guest("guest-1"), Arc::new(MemoryDocumentStore::new()));

        assert_eq!(session.reset(), 4);
        assert_eq!(session.epoch(), 4);
        assert!(session.user_id().is_none());
        assert_eq!(session.auth(), AuthState::Pending);
    }

    #[tokio::test]
    async fn test_view_reports_loading_while_read_is_in_flight() {
        let store = Arc::new(GatedStore {
            inner: MemoryDocumentStore::new(),
            entered: Notify::new(),
            gate: Notify::new(),
        });
        let shared = Session::shared(0);
        shared.lock().await.attach(guest("guest-1"), store.clone());

        let task = tokio::spawn({
            let shared = shared.clone();
            async move { reload(&shared).await }
        });
        store.entered.notified().await;

        {
            let mut session = shared.lock().await;
            let view = session.view();
            assert!(view.loading);
            assert_eq!(view.auth, AuthState::Ready);
            assert_eq!(session.add("too early").await, Outcome::Skipped);
        }

        store.gate.notify_one();
        task.await.expect("Reload task panicked");

        let view = shared.lock().await.view();
        assert!(!view.loading);
        assert!(view.todos.is_empty());
    }

    #[tokio::test]
    async fn test_read_finished_after_reset_is_dropped() {
        let memory = Arc::new(MemoryDocumentStore::new());
        let mut session = Session::pending(0);
        session.attach(guest("guest-1"), memory.clone());
        load(&mut session).await;
        session.add("old session").await;

        let pending = session.begin_load().expect("Session has a list");
        let fetched = pending.fetch().await;
        session.reset();
        session.attach(guest("guest-2"), memory);

        assert!(!session.finish_load(pending, fetched));
        assert!(session.view().todos.is_empty());
    }

    #[tokio::test]
    async fn test_completed_todo_cannot_be_edited() {
        let memory = Arc::new(MemoryDocumentStore::new());
        let mut session = Session::pending(0);
        session.attach(guest("guest-1"), memory.clone());
        load(&mut session).await;
        session.add("done already").await;
        let id = session.view().todos[0].id.clone();
        session.toggle_complete(&id).await;
        let writes = memory.replace_calls();

        assert_eq!(session.edit(&id, "rewritten").await, Outcome::Skipped);
        assert_eq!(session.view().todos[0].text, "done already");
        assert_eq!(memory.replace_calls(), writes);

        session.toggle_complete(&id).await;
        assert_eq!(session.edit(&id, "rewritten").await, Outcome::Applied);
        assert_eq!(session.view().todos[0].text, "rewritten");
    }
}
