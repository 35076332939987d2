use axum::{
    Router,
    extract::{
        Query, State, WebSocketUpgrade,
        ws::rejection::WebSocketUpgradeRejection,
    },
    http::HeaderMap,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;

use parley_gateway::connection;

use crate::error::ApiError;
use crate::middleware::{bearer_token, require_auth, verify_token};
use crate::state::AppState;
use crate::{analytics, auth, automations, billing, conversations, messages, templates, webhooks};

/// Every HTTP and WebSocket route of the service, without transport layers.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/auth/signup", post(auth::authenticate))
        .route("/api/auth/login", post(auth::authenticate))
        .route("/api/auth/forgot", post(auth::forgot_password))
        .route("/api/auth/reset", post(auth::reset_password))
        .route("/api/session", get(messages::session_status))
        .route("/health", get(health))
        .route("/ws", get(ws_upgrade));

    // Authenticated by shared secret, not by session token.
    let webhook_routes = Router::new()
        .route("/api/billing/webhook", post(billing::payment_webhook))
        .route("/api/webhooks/inbound", post(webhooks::inbound_message))
        .route("/api/webhooks/status", post(webhooks::session_update));

    let protected_routes = Router::new()
        .route("/api/messages", get(messages::get_messages))
        .route("/api/send", post(messages::send_message))
        .route("/api/contacts", get(messages::list_contacts))
        .route(
            "/api/conversations",
            get(conversations::list_conversations).post(conversations::ensure_conversation),
        )
        .route("/api/conversations/assign", post(conversations::assign_conversation))
        .route("/api/conversations/unassign", post(conversations::unassign_conversation))
        .route(
            "/api/templates",
            get(templates::list_templates).post(templates::create_template),
        )
        .route(
            "/api/templates/{id}",
            get(templates::get_template)
                .put(templates::update_template)
                .delete(templates::delete_template),
        )
        .route(
            "/api/automations",
            get(automations::list_automations).post(automations::create_automation),
        )
        .route(
            "/api/automations/{id}",
            get(automations::get_automation)
                .put(automations::update_automation)
                .delete(automations::delete_automation),
        )
        .route(
            "/api/billing/invoices",
            get(billing::list_invoices).post(billing::create_invoice),
        )
        .route("/api/billing/subscription", get(billing::current_subscription))
        .route("/api/analytics/overview", get(analytics::overview))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(webhook_routes)
        .merge(protected_routes)
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

/// Browsers cannot set headers on WebSocket requests, so the token may come
/// in the query string. It is checked before the upgrade.
async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let token = query
        .token
        .as_deref()
        .filter(|t| !t.is_empty())
        .or_else(|| bearer_token(&headers));

    let claims = match token {
        Some(token) => match verify_token(&state.jwt_secret, token) {
            Ok(claims) => claims,
            Err(e) => return e.into_response(),
        },
        None => return ApiError::Unauthorized("missing token").into_response(),
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let dispatcher = state.dispatcher.clone();
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, dispatcher, claims.sub, claims.email)
    })
}
