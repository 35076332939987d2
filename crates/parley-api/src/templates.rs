use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use parley_types::api::TemplateRequest;
use parley_types::models::Template;

use crate::error::{ApiError, ApiResult, require_text};
use crate::messages::ListQuery;
use crate::state::{AppState, with_db};

fn validate(req: &TemplateRequest) -> ApiResult<()> {
    require_text("name", &req.name)?;
    require_text("content", &req.content)
}

/// Blank categories are stored as absent.
fn category(req: &TemplateRequest) -> Option<String> {
    req.category
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}

pub async fn list_templates(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<impl IntoResponse> {
    let rows = with_db(&state, move |db| Ok(db.list_templates(query.limit)?)).await?;

    let templates: Vec<Template> = rows.into_iter().map(Template::from).collect();
    Ok(Json(templates))
}

pub async fn create_template(
    State(state): State<AppState>,
    Json(req): Json<TemplateRequest>,
) -> ApiResult<impl IntoResponse> {
    validate(&req)?;
    let category = category(&req);

    let row = with_db(&state, move |db| {
        Ok(db.create_template(req.name.trim(), category.as_deref(), &req.content)?)
    })
    .await?;

    info!("Created template {} ({})", row.id, row.name);
    Ok((StatusCode::CREATED, Json(Template::from(row))))
}

pub async fn get_template(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let row = with_db(&state, move |db| db.get_template(id)?.ok_or(ApiError::NotFound)).await?;
    Ok(Json(Template::from(row)))
}

pub async fn update_template(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<TemplateRequest>,
) -> ApiResult<impl IntoResponse> {
    validate(&req)?;
    let category = category(&req);

    let row = with_db(&state, move |db| {
        db.update_template(id, req.name.trim(), category.as_deref(), &req.content)?
            .ok_or(ApiError::NotFound)
    })
    .await?;

    Ok(Json(Template::from(row)))
}

pub async fn delete_template(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let deleted = with_db(&state, move |db| Ok(db.delete_template(id)?)).await?;
    if !deleted {
        return Err(ApiError::NotFound);
    }

    info!("Deleted template {}", id);
    Ok(StatusCode::NO_CONTENT)
}
