use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use chatdesk_schema::FileInfo;
use serde_json::Value;

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/save-file-info", post(save_file_info))
        .route("/get-files-info", get(get_files_info))
}

async fn save_file_info(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<FileInfo>, ApiError> {
    let Json(body) = body?;
    let info = state
        .store
        .register_file(body["file_name"].as_str(), body["file_path"].as_str())
        .await?;
    Ok(Json(info))
}

async fn get_files_info(State(state): State<AppState>) -> Json<Vec<FileInfo>> {
    Json(state.store.files().await)
}
