use axum::Json;
use axum::extract::{Path, Query};
use axum::routing::{patch, post};
use axum::{Router, extract::State, http::StatusCode, routing::get};
use serde::Deserialize;

use crate::error::AppError;
use crate::models::{NewTodoRequest, UpdateTodoRequest};
use crate::services::{SessionView, reload};
use crate::state::AppState;

#[derive(Deserialize)]
struct ResetParams {
    #[serde(default)]
    forget: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/todos", get(list_todos).post(create_todo))
        .route("/todos/{id}", patch(update_todo).delete(delete_todo))
        .route("/todos/{id}/toggle", post(toggle_todo))
        .route("/session/reload", post(reload_session))
        .route("/session/reset", post(reset_session))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.backend.health().await?;
    Ok(StatusCode::OK)
}

async fn list_todos(State(state): State<AppState>) -> Json<SessionView> {
    Json(state.session.lock().await.view())
}

async fn create_todo(
    State(state): State<AppState>,
    Json(req): Json<NewTodoRequest>
) -> Json<SessionView> {
    let mut session = state.session.lock().await;
    session.add(&req.text).await;
    Json(session.view())
}

async fn update_todo(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateTodoRequest>
) -> Json<SessionView> {
    let mut session = state.session.lock().await;
    session.edit(&id, &req.text).await;
    Json(session.view())
}

async fn toggle_todo(
    State(state): State<AppState>,
    Path(id): Path<String>
) -> Json<SessionView> {
    let mut session = state.session.lock().await;
    session.toggle_complete(&id).await;
    Json(session.view())
}

async fn delete_todo(
    State(state): State<AppState>,
    Path(id): Path<String>
) -> Json<SessionView> {
    let mut session = state.session.lock().await;
    session.delete(&id).await;
    Json(session.view())
}

async fn reload_session(State(state): State<AppState>) -> Json<SessionView> {
    reload(&state.session).await;
    Json(state.session.lock().await.view())
}

async fn reset_session(
    State(state): State<AppState>,
    Query(params): Query<ResetParams>
) -> Result<Json<SessionView>, AppError> {
    state.reset_session(params.forget).await?;
    Ok(Json(state.session.lock().await.view()))
}
