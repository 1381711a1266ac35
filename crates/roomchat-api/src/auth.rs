use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::debug;

use roomchat_core::Identity;
use roomchat_types::api::{LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};

use crate::error::{ApiError, ApiResult};
use crate::{AppState, blocking};

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let account = blocking(&state, move |chat| chat.register(&req.username, &req.password)).await?;

    let token = state
        .keys
        .issue(&Identity::from(&account))
        .map_err(ApiError::Token)?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id: account.id,
            token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let username = req.username.clone();
    let account = blocking(&state, move |chat| chat.authenticate(&req.username, &req.password))
        .await
        .inspect_err(|e| debug!("Login for {} rejected: {}", username, e))?;

    let token = state
        .keys
        .issue(&Identity::from(&account))
        .map_err(ApiError::Token)?;

    Ok(Json(LoginResponse {
        user_id: account.id,
        username: account.username,
        token,
    }))
}
