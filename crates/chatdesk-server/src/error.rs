use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chatdesk_schema::{ErrorBody, ErrorKind};
use chatdesk_store::StoreError;

/// Handler error rendered as a status code plus a JSON `{error, kind}` body.
#[derive(Debug)]
pub struct ApiError(pub StoreError);

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(StoreError::BadRequest(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        // Conflicts share 400 with malformed input; clients tell them apart by `kind`.
        let status = match kind {
            ErrorKind::BadRequest | ErrorKind::Conflict => StatusCode::BAD_REQUEST,
        };
        tracing::debug!(status = %status, error = %self.0, "request rejected");
        let body = ErrorBody {
            error: self.0.to_string(),
            kind: Some(kind),
        };
        (status, Json(body)).into_response()
    }
}
