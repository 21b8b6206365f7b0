use axum::{extract::State, Json};
use serde::Deserialize;
use tracing::{debug, error};

use crate::database::models::MenuItem;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MenuFilterRequest {
    pub mail: Option<String>,
    pub token: Option<String>,
    pub cargo: Option<String>,
}

/// POST /api/web/filter - Menu entries visible to the caller's role
///
/// All three body fields are required; menu items are matched on the
/// caller's `cargo` tag or the wildcard `all`.
pub async fn filter_post(
    State(state): State<AppState>,
    Json(payload): Json<MenuFilterRequest>,
) -> ApiResult<Vec<MenuItem>> {
    let (Some(mail), Some(_token), Some(cargo)) = (
        payload.mail.filter(|v| !v.is_empty()),
        payload.token.filter(|v| !v.is_empty()),
        payload.cargo.filter(|v| !v.is_empty()),
    ) else {
        return Err(ApiError::bad_request("mail, token and cargo are required"));
    };

    debug!(%mail, %cargo, "filtering menu entries");

    let pool = state.manager.control_pool().await?;
    let items: Vec<MenuItem> = sqlx::query_as(
        "SELECT label, path, icon FROM menu WHERE tagg ? $1 OR tagg ? 'all' ORDER BY label",
    )
    .bind(&cargo)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        error!("menu filter query failed: {}", e);
        ApiError::internal_server_error("Failed to load menu")
    })?;

    Ok(ApiResponse::success(items))
}
