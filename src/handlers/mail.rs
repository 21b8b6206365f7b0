use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;

use crate::auth;
use crate::config;
use crate::error::ApiError;
use crate::mail::{EmailMessage, MailReceipt};
use crate::middleware::auth::extract_bearer_token;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMailRequest {
    pub access_key: Option<String>,
    pub token: Option<String>,
    #[serde(flatten)]
    pub message: EmailMessage,
}

/// POST /api/mail/send - Deliver a mail on behalf of an authenticated caller
///
/// Requires both a session token (bearer header, body field or query
/// parameter, in that order) and an `accessKey` matching the configured
/// `MAIL_KEY`. The fixed rate limit is applied by middleware before this
/// handler runs.
pub async fn send_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    Json(payload): Json<SendMailRequest>,
) -> ApiResult<MailReceipt> {
    let token = extract_bearer_token(&headers)
        .or_else(|| payload.token.clone().filter(|t| !t.is_empty()))
        .or_else(|| query.get("token").cloned().filter(|t| !t.is_empty()))
        .ok_or_else(|| ApiError::unauthorized("Missing session token"))?;

    let pool = state.manager.control_pool().await?;
    auth::resolve_token(&pool, &token)
        .await
        .ok_or_else(|| ApiError::unauthorized("Invalid session token"))?;

    let mail_key = &config::config().security.mail_key;
    let supplied = payload.access_key.as_deref().unwrap_or("");
    if mail_key.is_empty() || supplied != mail_key {
        return Err(ApiError::unauthorized("Invalid access key"));
    }

    let receipt = state.mailer.send(&payload.message).await?;
    Ok(ApiResponse::success(receipt))
}
