use std::time::Duration;

use guest_todo::config::{AppConfig, BackendKind};
use guest_todo::services::AuthState;
use guest_todo::state::AppState;

fn sqlite_config(dir: &tempfile::TempDir) -> AppConfig {
    AppConfig {
        backend: BackendKind::Sqlite,
        database_url: format!("sqlite://{}?mode=rwc", dir.path().join("todos.db").display()),
        guest_id_path: dir.path().join("identity.json"),
        identity_retry_delay: Duration::from_millis(1),
        ..AppConfig::default()
    }
}

#[tokio::test]
async fn test_sqlite_session_survives_restart() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = sqlite_config(&dir);

    let state = AppState::from_config(&config).await.expect("Failed to build state");
    state.start_session().await.await.expect("Bootstrap task panicked");
    let user_id = {
        let mut session = state.session.lock().await;
        session.add("survive restart").await;
        session.view().user_id
    };
    drop(state);

    // same device file, same database
    let restarted = AppState::from_config(&config).await.expect("Failed to build state");
    restarted.start_session().await.await.expect("Bootstrap task panicked");

    let view = restarted.session.lock().await.view();
    assert_eq!(view.auth, AuthState::Ready);
    assert!(!view.loading);
    assert_eq!(view.user_id, user_id);
    assert_eq!(view.todos.len(), 1);
    assert_eq!(view.todos[0].text, "survive restart");
}

#[tokio::test]
async fn test_session_is_loading_until_bootstrap_runs() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = AppConfig {
        guest_id_path: dir.path().join("identity.json"),
        ..AppConfig::default()
    };

    let state = AppState::from_config(&config).await.expect("Failed to build state");
    assert!(state.session.lock().await.view().loading);

    state.start_session().await.await.expect("Bootstrap task panicked");
    assert!(!state.session.lock().await.view().loading);
}
