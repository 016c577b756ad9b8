//! Scenario catalogue handlers.

use axum::Json;
use axum::extract::{Path, State};
use parla_core::scenarios;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::ScenarioResponse;

/// `GET /scenarios`: list role-play scenarios.
pub async fn list_scenarios_handler(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<ScenarioResponse>>> {
    let rows = scenarios::list_scenarios(&state.pool).await?;
    Ok(Json(rows.into_iter().map(ScenarioResponse::from).collect()))
}

/// `GET /scenarios/{slug}`: one scenario.
pub async fn get_scenario_handler(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<Json<ScenarioResponse>> {
    let row = scenarios::get_scenario_by_slug(&state.pool, &slug)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => AppError::NotFound(format!("Scenario '{slug}' not found")),
            other => other.into(),
        })?;
    Ok(Json(row.into()))
}
