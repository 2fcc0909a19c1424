//! CAPTCHA generation and verification endpoints.

use aktar_common::{ApiResponse, PublicChallenge, VerifiedToken, VerifyRequest};
use axum::{Json, extract::State, extract::rejection::JsonRejection};

use super::{ApiResult, body};
use crate::state::AppState;

/// Generate a new CAPTCHA challenge
pub async fn create_challenge(State(state): State<AppState>) -> ApiResult<PublicChallenge> {
    let challenge = state.generator.create(&state.store).await?;
    Ok(Json(ApiResponse::ok(challenge)))
}

/// Verify a circle selection
pub async fn verify_challenge(
    State(state): State<AppState>,
    payload: Result<Json<VerifyRequest>, JsonRejection>,
) -> ApiResult<VerifiedToken> {
    let req = body(payload)?;

    tracing::debug!(
        challenge_id = %req.captcha_id,
        selected = req.selected_index,
        "Verifying CAPTCHA"
    );

    let token = state
        .verifier
        .verify(&state.store, &req.captcha_id, req.selected_index)
        .await?;

    Ok(Json(ApiResponse::ok(token)))
}
