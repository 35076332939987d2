use axum::{
    Extension, Json,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use parley_db::models::NewInvoice;
use parley_db::queries::MAX_BILLING_MONTHS;
use parley_types::api::{
    Claims, CreateInvoiceRequest, PaymentWebhook, PaymentWebhookResponse, SubscriptionResponse,
};
use parley_types::models::{Invoice, Subscription};

use crate::error::{ApiError, ApiResult, require_text};
use crate::messages::ListQuery;
use crate::middleware::check_webhook_secret;
use crate::state::{AppState, with_db};

/// The caller's workspace invoices, newest first.
pub async fn list_invoices(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ListQuery>,
) -> ApiResult<impl IntoResponse> {
    let workspace_id = claims.ws.id;
    let rows = with_db(&state, move |db| Ok(db.list_invoices(workspace_id, query.limit)?)).await?;

    let invoices: Vec<Invoice> = rows.into_iter().map(Invoice::from).collect();
    Ok(Json(invoices))
}

/// Open a pending invoice for the caller's workspace.
pub async fn create_invoice(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateInvoiceRequest>,
) -> ApiResult<impl IntoResponse> {
    require_text("plan", &req.plan)?;
    require_text("currency", &req.currency)?;
    if !req.amount.is_finite() || req.amount < 0.0 {
        return Err(ApiError::BadRequest("amount must be a non-negative number".into()));
    }

    let new = NewInvoice {
        invoice_id: Uuid::new_v4().to_string(),
        workspace_id: claims.ws.id,
        workspace: claims.ws.slug.clone(),
        plan: req.plan.trim().to_string(),
        amount: req.amount,
        currency: req.currency.trim().to_uppercase(),
    };

    let row = with_db(&state, move |db| Ok(db.create_invoice(&new)?)).await?;

    info!("Invoice {} opened for {} ({})", row.invoice_id, row.workspace, row.plan);
    Ok((StatusCode::CREATED, Json(Invoice::from(row))))
}

pub async fn current_subscription(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let workspace_id = claims.ws.id;
    let subscription = with_db(&state, move |db| Ok(db.current_subscription(workspace_id)?))
        .await?
        .map(Subscription::from);

    let expired = subscription
        .as_ref()
        .is_none_or(|sub| sub.is_expired(Utc::now()));

    Ok(Json(SubscriptionResponse {
        subscription,
        expired,
    }))
}

/// Payment provider confirmation. Replays are answered with the paid
/// invoice and never extend the subscription a second time.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PaymentWebhook>,
) -> ApiResult<impl IntoResponse> {
    check_webhook_secret(&state, &headers)?;
    require_text("invoice_id", &req.invoice_id)?;
    if !(1..=MAX_BILLING_MONTHS).contains(&req.months) {
        return Err(ApiError::BadRequest(format!(
            "months must be between 1 and {}",
            MAX_BILLING_MONTHS
        )));
    }

    let (invoice, subscription) = with_db(&state, move |db| {
        db.settle_invoice(req.invoice_id.trim(), req.months)?
            .ok_or(ApiError::NotFound)
    })
    .await?;

    match &subscription {
        Some(sub) => info!(
            "Invoice {} paid, {} subscribed to {} until {}",
            invoice.invoice_id, sub.workspace, sub.plan, sub.expires_at
        ),
        None => info!("Invoice {} was already paid", invoice.invoice_id),
    }

    Ok(Json(PaymentWebhookResponse {
        invoice: invoice.into(),
        subscription: subscription.map(Subscription::from),
    }))
}
