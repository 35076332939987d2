//! Database row types, mapping directly to SQLite rows.
//! Distinct from parley-types API models to keep the DB layer independent;
//! the `From` impls below are the only bridge between the two.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

use parley_types::flow::FlowDocument;
use parley_types::models::{
    Automation, Contact, Conversation, Direction, Invoice, InvoiceStatus, Message, Subscription,
    Template, User, Workspace,
};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

pub fn format_timestamp(t: DateTime<Utc>) -> String {
    t.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .or_else(|_| {
            // Rows written by hand through the sqlite shell use datetime('now').
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub created_at: String,
}

pub struct WorkspaceRow {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub owner_user_id: i64,
}

pub struct NewMessage {
    pub from_number: String,
    pub to_number: String,
    pub direction: Direction,
    pub text: String,
    pub meta: serde_json::Value,
}

pub struct MessageRow {
    pub id: i64,
    pub from_number: String,
    pub to_number: String,
    pub direction: String,
    pub text: String,
    pub meta: String,
    pub created_at: String,
}

pub struct ContactRow {
    pub id: i64,
    pub phone: String,
    pub name: Option<String>,
    pub created_at: String,
}

pub struct ConversationRow {
    pub id: i64,
    pub peer: String,
    pub assigned_user_id: Option<i64>,
    pub assigned_at: Option<String>,
}

pub struct TemplateRow {
    pub id: i64,
    pub name: String,
    pub category: Option<String>,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
}

pub struct AutomationRow {
    pub id: i64,
    pub name: String,
    pub flow_json: String,
    pub created_at: String,
    pub updated_at: String,
}

pub struct NewInvoice {
    pub invoice_id: String,
    /// Owning workspace; the slug is kept for display only.
    pub workspace_id: i64,
    pub workspace: String,
    pub plan: String,
    pub amount: f64,
    pub currency: String,
}

pub struct InvoiceRow {
    pub id: i64,
    pub invoice_id: String,
    pub workspace_id: i64,
    pub workspace: String,
    pub plan: String,
    pub amount: f64,
    pub currency: String,
    pub status: String,
    pub created_at: String,
    pub paid_at: Option<String>,
}

pub struct SubscriptionRow {
    pub id: i64,
    pub workspace_id: i64,
    pub workspace: String,
    pub plan: String,
    pub status: String,
    pub started_at: String,
    pub expires_at: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            created_at: parse_timestamp(&row.created_at),
        }
    }
}

impl From<WorkspaceRow> for Workspace {
    fn from(row: WorkspaceRow) -> Self {
        Self {
            id: row.id,
            slug: row.slug,
            name: row.name,
            owner_user_id: row.owner_user_id,
        }
    }
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        let direction = row.direction.parse().unwrap_or_else(|e| {
            warn!("Corrupt direction on message {}: {}", row.id, e);
            Direction::In
        });
        let meta = serde_json::from_str(&row.meta).unwrap_or_else(|e| {
            warn!("Corrupt meta on message {}: {}", row.id, e);
            serde_json::Value::Object(Default::default())
        });

        Self {
            id: row.id,
            from_number: row.from_number,
            to_number: row.to_number,
            direction,
            text: row.text,
            meta,
            created_at: parse_timestamp(&row.created_at),
        }
    }
}

impl From<ContactRow> for Contact {
    fn from(row: ContactRow) -> Self {
        Self {
            id: row.id,
            phone: row.phone,
            name: row.name,
            created_at: parse_timestamp(&row.created_at),
        }
    }
}

impl From<ConversationRow> for Conversation {
    fn from(row: ConversationRow) -> Self {
        Self {
            id: row.id,
            peer: row.peer,
            assigned_user_id: row.assigned_user_id,
            assigned_at: row.assigned_at.as_deref().map(parse_timestamp),
        }
    }
}

impl From<TemplateRow> for Template {
    fn from(row: TemplateRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            category: row.category,
            content: row.content,
            created_at: parse_timestamp(&row.created_at),
            updated_at: parse_timestamp(&row.updated_at),
        }
    }
}

impl From<AutomationRow> for Automation {
    fn from(row: AutomationRow) -> Self {
        let flow_json: FlowDocument = serde_json::from_str(&row.flow_json).unwrap_or_else(|e| {
            warn!("Corrupt flow_json on automation {}: {}", row.id, e);
            FlowDocument::default()
        });

        Self {
            id: row.id,
            name: row.name,
            flow_json,
            created_at: parse_timestamp(&row.created_at),
            updated_at: parse_timestamp(&row.updated_at),
        }
    }
}

impl From<InvoiceRow> for Invoice {
    fn from(row: InvoiceRow) -> Self {
        let status = row.status.parse().unwrap_or_else(|e| {
            warn!("Corrupt status on invoice {}: {}", row.invoice_id, e);
            InvoiceStatus::Pending
        });

        Self {
            id: row.id,
            invoice_id: row.invoice_id,
            workspace_id: row.workspace_id,
            workspace: row.workspace,
            plan: row.plan,
            amount: row.amount,
            currency: row.currency,
            status,
            created_at: parse_timestamp(&row.created_at),
            paid_at: row.paid_at.as_deref().map(parse_timestamp),
        }
    }
}

impl From<SubscriptionRow> for Subscription {
    fn from(row: SubscriptionRow) -> Self {
        Self {
            id: row.id,
            workspace_id: row.workspace_id,
            workspace: row.workspace,
            plan: row.plan,
            status: row.status,
            started_at: parse_timestamp(&row.started_at),
            expires_at: parse_timestamp(&row.expires_at),
        }
    }
}
