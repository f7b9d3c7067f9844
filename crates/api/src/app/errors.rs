use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

pub fn json_error(status: StatusCode, message: &str) -> axum::response::Response {
    (status, axum::Json(json!({ "error": message }))).into_response()
}
