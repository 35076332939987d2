use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use chrono::Utc;
use tracing::{debug, info};

use parley_db::models::NewMessage;
use parley_types::api::InboundMessage;
use parley_types::events::GatewayEvent;
use parley_types::models::{Direction, Message, SessionStatus};

use crate::error::{ApiResult, require_text};
use crate::middleware::check_webhook_secret;
use crate::state::{AppState, with_db};

/// A message the bridge received from the network.
pub async fn inbound_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<InboundMessage>,
) -> ApiResult<impl IntoResponse> {
    check_webhook_secret(&state, &headers)?;

    let from = req.from.trim().to_string();
    require_text("from", &from)?;
    require_text("to", &req.to)?;

    let name = req
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());
    let at = req.timestamp.unwrap_or_else(Utc::now);
    let new = NewMessage {
        from_number: from.clone(),
        to_number: req.to.trim().to_string(),
        direction: Direction::In,
        text: req.text,
        meta: req.meta.unwrap_or_else(|| serde_json::json!({})),
    };

    let row = with_db(&state, move |db| {
        db.upsert_contact(&from, name.as_deref())?;
        db.ensure_conversation(&from)?;
        Ok(db.save_message_at(&new, at)?)
    })
    .await?;

    let message = Message::from(row);
    let delivered = state.dispatcher.broadcast(GatewayEvent::from(&message));
    debug!("inbound message {} queued for {} subscribers", message.id, delivered);

    Ok((StatusCode::CREATED, Json(message)))
}

/// The bridge reports connection changes and fresh QR codes here.
pub async fn session_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(status): Json<SessionStatus>,
) -> ApiResult<impl IntoResponse> {
    check_webhook_secret(&state, &headers)?;

    info!(
        "Bridge session {}{}",
        if status.connected { "connected" } else { "disconnected" },
        if status.qr.is_some() { " (QR pending)" } else { "" }
    );
    state.dispatcher.set_session_status(status.clone()).await;

    Ok(Json(status))
}
