use axum::{
    Extension, Json,
    extract::{Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::info;

use parley_types::api::{Claims, PeerRequest};
use parley_types::models::{Conversation, ConversationFilter};

use crate::error::{ApiError, ApiResult, require_text};
use crate::state::{AppState, with_db};

#[derive(Debug, Deserialize)]
pub struct ConversationQuery {
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    100
}

pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ConversationQuery>,
) -> ApiResult<impl IntoResponse> {
    let filter = match query.filter.as_deref() {
        None | Some("") => ConversationFilter::All,
        Some(raw) => raw.parse::<ConversationFilter>().map_err(ApiError::BadRequest)?,
    };

    let items = with_db(&state, move |db| {
        Ok(db.list_conversations(query.limit, filter, claims.sub)?)
    })
    .await?;

    Ok(Json(items))
}

pub async fn ensure_conversation(
    State(state): State<AppState>,
    Json(req): Json<PeerRequest>,
) -> ApiResult<impl IntoResponse> {
    let peer = req.peer.trim().to_string();
    require_text("peer", &peer)?;

    let row = with_db(&state, move |db| Ok(db.ensure_conversation(&peer)?)).await?;
    Ok(Json(Conversation::from(row)))
}

/// Assign a conversation to the caller; reassignment overwrites.
pub async fn assign_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<PeerRequest>,
) -> ApiResult<impl IntoResponse> {
    let peer = req.peer.trim().to_string();
    require_text("peer", &peer)?;

    let user_id = claims.sub;
    let row = with_db(&state, move |db| Ok(db.assign_conversation(&peer, user_id)?)).await?;

    info!("{} assigned conversation {}", claims.email, row.peer);
    Ok(Json(Conversation::from(row)))
}

pub async fn unassign_conversation(
    State(state): State<AppState>,
    Json(req): Json<PeerRequest>,
) -> ApiResult<impl IntoResponse> {
    let peer = req.peer.trim().to_string();
    require_text("peer", &peer)?;

    let row = with_db(&state, move |db| {
        db.unassign_conversation(&peer)?.ok_or(ApiError::NotFound)
    })
    .await?;

    Ok(Json(Conversation::from(row)))
}
