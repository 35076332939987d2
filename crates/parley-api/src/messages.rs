use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::debug;

use parley_db::models::NewMessage;
use parley_types::api::{Claims, SendMessageRequest};
use parley_types::events::GatewayEvent;
use parley_types::models::{Contact, Direction, Message};

use crate::error::{ApiResult, require_text};
use crate::state::{AppState, with_db};

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Only messages exchanged with this number.
    pub peer: Option<String>,
}

fn default_limit() -> u32 {
    200
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

pub async fn get_messages(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
) -> ApiResult<impl IntoResponse> {
    let peer = query.peer.filter(|p| !p.trim().is_empty());

    let rows = with_db(&state, move |db| Ok(db.get_messages(query.limit, peer.as_deref())?)).await?;

    let messages: Vec<Message> = rows.into_iter().map(Message::from).collect();
    Ok(Json(messages))
}

/// Record an outbound message and announce it. Delivery to the network is
/// the bridge's job; it picks the message up from the push channel.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let to = req.to.trim().to_string();
    require_text("to", &to)?;
    require_text("text", &req.text)?;

    let new = NewMessage {
        from_number: state.business_number.clone(),
        to_number: to.clone(),
        direction: Direction::Out,
        text: req.text,
        meta: serde_json::json!({ "sent_by": claims.sub }),
    };

    let row = with_db(&state, move |db| {
        db.upsert_contact(&to, None)?;
        db.ensure_conversation(&to)?;
        Ok(db.save_message(&new)?)
    })
    .await?;

    let message = Message::from(row);
    let delivered = state.dispatcher.broadcast(GatewayEvent::from(&message));
    debug!("message {} queued for {} subscribers", message.id, delivered);

    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn list_contacts(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<impl IntoResponse> {
    let rows = with_db(&state, move |db| Ok(db.list_contacts(query.limit)?)).await?;

    let contacts: Vec<Contact> = rows.into_iter().map(Contact::from).collect();
    Ok(Json(contacts))
}

/// Public: the dashboard polls this before login to show the QR code.
pub async fn session_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.dispatcher.session_status().await)
}
