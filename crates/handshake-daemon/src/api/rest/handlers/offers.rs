//! Credential offer and mobile deep-link handlers

use super::authentication::{TokenRequest, TokenResponse};
use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::{extract::State, Json};

/// Broadcast credential offer
pub async fn credential_offer(State(state): State<AppState>) -> ApiResult<Json<TokenResponse>> {
    let callback = state.config.server.credential_receive_callback();
    let token = state.wallet.create_credential_offer(&callback).await?;
    Ok(Json(TokenResponse { token }))
}

/// Credential request answered through the mobile app's deep link
pub async fn mobile_credential_request(State(state): State<AppState>) -> ApiResult<String> {
    let request = state
        .wallet
        .create_auth_request(
            &state.config.server.deep_link_callback,
            &state.config.requirements,
        )
        .await?;
    Ok(request.encoded)
}

/// Credential offer request for the mobile app
pub async fn mobile_credential_offer_request(State(state): State<AppState>) -> ApiResult<String> {
    let callback = state.config.server.credential_receive_callback();
    Ok(state.wallet.create_credential_offer(&callback).await?)
}

/// Exchange an offer response for a signed credential
pub async fn credential_receive(
    State(state): State<AppState>,
    Json(req): Json<TokenRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let token = state.receiver.receive_offer(&req.token).await?;
    Ok(Json(TokenResponse { token }))
}
