use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{get, post},
    Json, Router,
};
use chatdesk_schema::{ChatMessage, ChatsDump, NewChatResponse};
use serde_json::Value;

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/new-chat", post(new_chat))
        .route("/get-history/{session_id}", get(get_history))
        .route("/get-chats", get(get_chats))
        .route("/get-all-sessions", get(get_all_sessions))
        .route("/add-message/{session_id}", post(add_message))
}

async fn new_chat(State(state): State<AppState>) -> Json<NewChatResponse> {
    let session_id = state.store.create_session().await;
    Json(NewChatResponse { session_id })
}

async fn get_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Json<Vec<ChatMessage>> {
    Json(state.store.history(&session_id).await)
}

async fn get_chats(State(state): State<AppState>) -> Json<ChatsDump> {
    Json(state.store.all_sessions().await)
}

async fn get_all_sessions(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.store.session_ids().await)
}

/// Body must be `{"message": {"role": .., "content": ..}}`; anything else is a 400.
async fn add_message(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    let Json(body) = body?;
    // Indexing yields Null for a missing key or a non-object body.
    let messages = state
        .store
        .append_message(&session_id, &body["message"])
        .await?;
    Ok(Json(messages))
}
