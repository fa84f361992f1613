use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::{error, info};

use crate::tracker::QuotaError;

use super::types::{
    CommandRequest, CommandResponse, ConsumeResponse, ErrorResponse, QuotaStatusResponse,
};
use super::ApiState;

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

pub async fn get_status(
    State(state): State<Arc<ApiState>>,
    Path(identity): Path<String>,
) -> ApiResult<QuotaStatusResponse> {
    let status = state
        .quota_manager
        .get_status(&identity)
        .await
        .map_err(quota_error)?;

    Ok(Json(QuotaStatusResponse {
        identity,
        remaining: status.remaining,
        next_reset: status.next_reset,
        total_consumed: status.total_consumed,
        registered: status.registered,
    }))
}

pub async fn consume(
    State(state): State<Arc<ApiState>>,
    Path(identity): Path<String>,
) -> ApiResult<ConsumeResponse> {
    let remaining = state
        .quota_manager
        .try_consume(&identity)
        .await
        .map_err(quota_error)?;

    info!(identity = %identity, remaining, "quota consumed via API");
    Ok(Json(ConsumeResponse {
        identity,
        remaining,
    }))
}

pub async fn run_command(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<CommandRequest>,
) -> ApiResult<CommandResponse> {
    if request.user_id.trim().is_empty() {
        return Err(bad_request("invalid_identity", "user_id cannot be empty"));
    }

    let reply = state.access.handle(&request.user_id, &request.text).await;
    Ok(Json(CommandResponse { reply }))
}

pub async fn health_check() -> ApiResult<serde_json::Value> {
    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": "access-quota-tracker"
    })))
}

fn quota_error(err: QuotaError) -> (StatusCode, Json<ErrorResponse>) {
    match err {
        QuotaError::Exhausted { next_reset, .. } => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ErrorResponse {
                error: "quota exhausted".to_string(),
                code: "quota_exhausted".to_string(),
                details: Some(serde_json::json!({ "next_reset": next_reset })),
            }),
        ),
        QuotaError::InvalidIdentity(_) => bad_request("invalid_identity", "identity cannot be empty"),
        QuotaError::StoreUnavailable(err) => {
            error!(error = %err, "quota API store failure");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: "quota store unavailable, try again later".to_string(),
                    code: "store_unavailable".to_string(),
                    details: None,
                }),
            )
        }
    }
}

fn bad_request(code: &str, message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_string(),
            code: code.to_string(),
            details: None,
        }),
    )
}
