use serde::{Deserialize, Serialize};

use crate::flow::FlowDocument;
use crate::models::{DayCount, Invoice, Subscription, Totals, TopContact, User, Workspace};

// -- JWT Claims --

/// Workspace identity embedded in a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceClaim {
    pub id: i64,
    pub slug: String,
    pub name: String,
}

impl From<&Workspace> for WorkspaceClaim {
    fn from(ws: &Workspace) -> Self {
        Self {
            id: ws.id,
            slug: ws.slug.clone(),
            name: ws.name.clone(),
        }
    }
}

/// JWT claims shared by the REST middleware and the WebSocket upgrade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub email: String,
    pub ws: WorkspaceClaim,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
pub struct AuthRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
    pub workspace: Workspace,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub email: String,
    pub code: String,
    pub new_password: String,
}

// -- Messages --

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub to: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct PeerRequest {
    pub peer: String,
}

// -- Templates --

#[derive(Debug, Deserialize)]
pub struct TemplateRequest {
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    pub content: String,
}

// -- Automations --

#[derive(Debug, Deserialize)]
pub struct AutomationRequest {
    pub name: String,
    #[serde(default)]
    pub flow_json: FlowDocument,
}

// -- Billing --

#[derive(Debug, Deserialize)]
pub struct CreateInvoiceRequest {
    pub plan: String,
    pub amount: f64,
    pub currency: String,
}

/// Payment provider confirmation, keyed by `invoice_id`.
#[derive(Debug, Deserialize)]
pub struct PaymentWebhook {
    pub invoice_id: String,
    #[serde(default = "default_months")]
    pub months: u32,
}

fn default_months() -> u32 {
    1
}

#[derive(Debug, Serialize)]
pub struct PaymentWebhookResponse {
    pub invoice: Invoice,
    pub subscription: Option<Subscription>,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionResponse {
    pub subscription: Option<Subscription>,
    pub expired: bool,
}

// -- Bridge --

/// A message received by the messaging bridge.
#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    pub from: String,
    pub to: String,
    pub text: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub meta: Option<serde_json::Value>,
    #[serde(default)]
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,
}

// -- Analytics --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsOverview {
    pub totals: Totals,
    pub by_day: Vec<DayCount>,
    pub top_contacts: Vec<TopContact>,
}
