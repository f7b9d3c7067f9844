use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{error, warn};

use warden_infra::submission::SubmissionError;

use super::errors::json_error;
use crate::state::AppState;

pub async fn get_stats(State(state): State<Arc<AppState>>) -> Response {
    let worker_state = state.clone();
    let result = tokio::task::spawn_blocking(move || worker_state.scoreboard.get_stats(true)).await;

    match result {
        Ok(Ok(teams)) => {
            let body = json!({
                "teams": &*teams,
                "roundNum": state.round_counter.get().0,
                "flagLifetime": state.config.misc.flag_lifetime,
            });
            (StatusCode::OK, Json(body)).into_response()
        }
        Ok(Err(e)) => {
            warn!(error = %e, "scoreboard refresh failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Generic error")
        }
        Err(e) => {
            error!(error = %e, "scoreboard task panicked");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Generic error")
        }
    }
}

pub async fn flag_submit(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(&body) else {
        return json_error(StatusCode::BAD_REQUEST, "Input data is not json");
    };
    let Some(obj) = value.as_object() else {
        return json_error(StatusCode::BAD_REQUEST, "Input data is not json");
    };

    let (Some(token_val), Some(flags_val)) = (obj.get("token"), obj.get("flags")) else {
        return json_error(StatusCode::BAD_REQUEST, "token or flags fields missing");
    };
    let Some(token) = token_val.as_str() else {
        return json_error(StatusCode::BAD_REQUEST, "token must be a string");
    };
    let Some(flags_arr) = flags_val.as_array() else {
        return json_error(StatusCode::BAD_REQUEST, "flags must be a list");
    };

    let token = token.to_string();
    let flags: Vec<String> = flags_arr
        .iter()
        .map(|v| v.as_str().unwrap_or_default().to_string())
        .collect();

    let worker_state = state.clone();
    let result =
        tokio::task::spawn_blocking(move || worker_state.submission.submit_flags(&token, flags)).await;

    match result {
        Ok(Ok(summary)) => (StatusCode::OK, Json(summary)).into_response(),
        Ok(Err(SubmissionError::InvalidToken)) => json_error(StatusCode::BAD_REQUEST, "Invalid token"),
        Ok(Err(SubmissionError::OutOfTimeWindow)) => {
            json_error(StatusCode::BAD_REQUEST, "Too early or too late to submit a flag")
        }
        Ok(Err(SubmissionError::RateLimitExceeded | SubmissionError::ServiceBusy)) => {
            json_error(StatusCode::BAD_REQUEST, "Rate limit exceeded")
        }
        Err(e) => {
            error!(error = %e, "flag submission task panicked");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Generic error")
        }
    }
}
