use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use parley_types::api::AutomationRequest;
use parley_types::models::Automation;

use crate::error::{ApiError, ApiResult, require_text};
use crate::messages::ListQuery;
use crate::state::{AppState, with_db};

/// Flows are checked on every save; nothing downstream re-validates them.
fn validate(req: &AutomationRequest) -> ApiResult<()> {
    require_text("name", &req.name)?;
    req.flow_json.validate()?;
    Ok(())
}

pub async fn list_automations(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<impl IntoResponse> {
    let rows = with_db(&state, move |db| Ok(db.list_automations(query.limit)?)).await?;

    let automations: Vec<Automation> = rows.into_iter().map(Automation::from).collect();
    Ok(Json(automations))
}

pub async fn create_automation(
    State(state): State<AppState>,
    Json(req): Json<AutomationRequest>,
) -> ApiResult<impl IntoResponse> {
    validate(&req)?;

    let row = with_db(&state, move |db| {
        Ok(db.create_automation(req.name.trim(), &req.flow_json)?)
    })
    .await?;

    info!("Created automation {} ({})", row.id, row.name);
    Ok((StatusCode::CREATED, Json(Automation::from(row))))
}

pub async fn get_automation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let row = with_db(&state, move |db| db.get_automation(id)?.ok_or(ApiError::NotFound)).await?;
    Ok(Json(Automation::from(row)))
}

pub async fn update_automation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<AutomationRequest>,
) -> ApiResult<impl IntoResponse> {
    validate(&req)?;

    let row = with_db(&state, move |db| {
        db.update_automation(id, req.name.trim(), &req.flow_json)?
            .ok_or(ApiError::NotFound)
    })
    .await?;

    Ok(Json(Automation::from(row)))
}

pub async fn delete_automation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let deleted = with_db(&state, move |db| Ok(db.delete_automation(id)?)).await?;
    if !deleted {
        return Err(ApiError::NotFound);
    }

    info!("Deleted automation {}", id);
    Ok(StatusCode::NO_CONTENT)
}
