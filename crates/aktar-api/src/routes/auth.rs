//! Registration, login, and session lookup endpoints.

use aktar_common::constants::headers::AUTHORIZATION;
use aktar_common::{
    AktarError, ApiResponse, AuthPayload, LoginRequest, RegisterPayload, RegisterRequest,
    UserProfile,
};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::HeaderMap,
};
use serde::{Deserialize, Serialize};

use super::{ApiError, ApiResult, body};
use crate::state::AppState;

pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<RegisterPayload> {
    let req = body(payload)?;
    let registered = state
        .auth
        .register(req, &state.store, &state.verifier)
        .await?;
    Ok(Json(ApiResponse::ok(registered)))
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<AuthPayload> {
    let req = body(payload)?;
    let session = state.auth.login(req, &state.store, &state.verifier).await?;
    Ok(Json(ApiResponse::ok(session)))
}

/// Profile behind the `Authorization: Bearer` token
pub async fn me(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<UserProfile> {
    let token = bearer(&headers).ok_or(ApiError(AktarError::Auth))?;
    let user = state.auth.current_user(token).await?;
    Ok(Json(ApiResponse::ok(user)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoverRequest {
    nickname: String,
    recovery_code: String,
    new_password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoverResponse {
    recovery_code: String,
}

/// Reset a password with the recovery code issued at registration
pub async fn recover(
    State(state): State<AppState>,
    payload: Result<Json<RecoverRequest>, JsonRejection>,
) -> ApiResult<RecoverResponse> {
    let req = body(payload)?;
    let recovery_code = state
        .auth
        .recover(&req.nickname, &req.recovery_code, req.new_password)
        .await?;
    Ok(Json(ApiResponse::ok(RecoverResponse { recovery_code })))
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
