//! Credential response submission

use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::{
    extract::{Path, State},
    Json,
};
use handshake_types::SessionId;
use serde::{Deserialize, Serialize};

/// Token posted by a device
#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub token: String,
}

/// Token handed back to a device
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Accept the credential response for a session
pub async fn submit_credential_response(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<TokenRequest>,
) -> ApiResult<Json<&'static str>> {
    let session_id = SessionId::new(session_id)?;
    state.receiver.submit(&session_id, &req.token).await?;
    Ok(Json("OK"))
}
