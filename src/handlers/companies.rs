use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use sqlx::types::Json as SqlJson;
use sqlx::PgPool;

use crate::database::models::{Company, PlanLimits};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanUpdateRequest {
    pub permissions: Option<Vec<String>>,
    pub plan_limits: Option<PlanLimits>,
}

#[derive(Debug, Deserialize)]
pub struct SuspensionRequest {
    pub suspended: bool,
}

/// GET /api/companies/:db_name - Fetch a company row from the control database
pub async fn company_get(
    State(state): State<AppState>,
    Path(db_name): Path<String>,
) -> ApiResult<Company> {
    let pool = state.manager.control_pool().await?;
    let company = fetch_company(&pool, &db_name)
        .await?
        .ok_or_else(|| ApiError::not_found("Company not found"))?;

    Ok(ApiResponse::success(company))
}

/// PUT /api/companies/:db_name/plan - Change a company's permission set
/// and/or plan limits, then propagate into its tenant database
pub async fn plan_put(
    State(state): State<AppState>,
    Path(db_name): Path<String>,
    Json(payload): Json<PlanUpdateRequest>,
) -> ApiResult<Company> {
    if payload.permissions.is_none() && payload.plan_limits.is_none() {
        return Err(ApiError::bad_request(
            "At least one of permissions or planLimits is required",
        ));
    }
    if let Some(limits) = &payload.plan_limits {
        limits.validate().map_err(ApiError::bad_request)?;
    }

    let pool = state.manager.control_pool().await?;
    let mut company = fetch_company(&pool, &db_name)
        .await?
        .ok_or_else(|| ApiError::not_found("Company not found"))?;

    if let Some(permissions) = &payload.permissions {
        sqlx::query("UPDATE empresas SET permissions = $1 WHERE db_name = $2")
            .bind(SqlJson(permissions))
            .bind(&db_name)
            .execute(&pool)
            .await
            .map_err(crate::database::DatabaseError::from)?;
        company.permissions = SqlJson(permissions.clone());
    }

    if let Some(limits) = &payload.plan_limits {
        sqlx::query("UPDATE empresas SET plan_limits = $1 WHERE db_name = $2")
            .bind(SqlJson(limits))
            .bind(&db_name)
            .execute(&pool)
            .await
            .map_err(crate::database::DatabaseError::from)?;
        company.plan_limits = SqlJson(limits.clone());
    }

    state
        .sync
        .synchronize(
            &company,
            payload.permissions.as_deref(),
            payload.plan_limits.as_ref(),
        )
        .await?;

    Ok(ApiResponse::success(company))
}

/// PUT /api/companies/:db_name/suspension - Toggle suspension and
/// re-synchronize the tenant with its stored permission set
pub async fn suspension_put(
    State(state): State<AppState>,
    Path(db_name): Path<String>,
    Json(payload): Json<SuspensionRequest>,
) -> ApiResult<Company> {
    let pool = state.manager.control_pool().await?;
    let mut company = fetch_company(&pool, &db_name)
        .await?
        .ok_or_else(|| ApiError::not_found("Company not found"))?;

    sqlx::query("UPDATE empresas SET is_suspended = $1 WHERE db_name = $2")
        .bind(payload.suspended)
        .bind(&db_name)
        .execute(&pool)
        .await
        .map_err(crate::database::DatabaseError::from)?;
    company.is_suspended = payload.suspended;

    // The suspension override narrows the effective set inside the sync
    let stored = company.permissions.0.clone();
    state.sync.synchronize(&company, Some(&stored), None).await?;

    Ok(ApiResponse::success(company))
}

async fn fetch_company(pool: &PgPool, db_name: &str) -> Result<Option<Company>, ApiError> {
    let company = sqlx::query_as::<_, Company>(
        "SELECT db_name, name, is_suspended, permissions, plan_limits \
         FROM empresas WHERE db_name = $1",
    )
    .bind(db_name)
    .fetch_optional(pool)
    .await
    .map_err(crate::database::DatabaseError::from)?;

    Ok(company)
}
