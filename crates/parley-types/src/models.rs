use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::flow::FlowDocument;

/// Which side of the conversation produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Received from the peer.
    In,
    /// Sent by the business.
    Out,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
        }
    }

    /// The peer of a message: the sender for inbound, the recipient for outbound.
    pub fn peer<'a>(&self, from_number: &'a str, to_number: &'a str) -> &'a str {
        match self {
            Self::In => from_number,
            Self::Out => to_number,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in" => Ok(Self::In),
            "out" => Ok(Self::Out),
            other => Err(format!("unknown direction '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub owner_user_id: i64,
}

/// Messages are append-only: once written they are never edited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub from_number: String,
    pub to_number: String,
    pub direction: Direction,
    pub text: String,
    pub meta: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn peer(&self) -> &str {
        self.direction.peer(&self.from_number, &self.to_number)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: i64,
    pub phone: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Stored assignment state for a peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: i64,
    pub peer: String,
    pub assigned_user_id: Option<i64>,
    pub assigned_at: Option<DateTime<Utc>>,
}

/// A row of the conversation list: latest activity per peer with the
/// assignment overlaid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub peer: String,
    pub last_time: DateTime<Utc>,
    pub assigned_user_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationFilter {
    #[default]
    All,
    Mine,
    Unassigned,
}

impl ConversationFilter {
    pub fn matches(&self, assigned_user_id: Option<i64>, user_id: i64) -> bool {
        match self {
            Self::All => true,
            Self::Mine => assigned_user_id == Some(user_id),
            Self::Unassigned => assigned_user_id.is_none(),
        }
    }
}

impl FromStr for ConversationFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "mine" => Ok(Self::Mine),
            "unassigned" => Ok(Self::Unassigned),
            other => Err(format!("unknown conversation filter '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: i64,
    pub name: String,
    pub category: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Automation {
    pub id: i64,
    pub name: String,
    pub flow_json: FlowDocument,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Invoices only ever move from `Pending` to `Paid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Pending,
    Paid,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
        }
    }
}

impl FromStr for InvoiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            other => Err(format!("unknown invoice status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: i64,
    pub invoice_id: String,
    pub workspace_id: i64,
    /// Workspace slug at the time of purchase, for display.
    pub workspace: String,
    pub plan: String,
    pub amount: f64,
    pub currency: String,
    pub status: InvoiceStatus,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: i64,
    pub workspace_id: i64,
    pub workspace: String,
    pub plan: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Subscription {
    /// Expiry is never enforced by the store; callers compare against a clock.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

// -- Analytics --

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    #[serde(rename = "in")]
    pub inbound: u64,
    #[serde(rename = "out")]
    pub outbound: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayCount {
    pub date: String,
    #[serde(rename = "in")]
    pub inbound: u64,
    #[serde(rename = "out")]
    pub outbound: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopContact {
    pub peer: String,
    pub count: u64,
}

/// Connection state of the messaging bridge, as last reported by it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub connected: bool,
    pub qr: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn peer_depends_on_direction() {
        assert_eq!(Direction::In.peer("+1", "+2"), "+1");
        assert_eq!(Direction::Out.peer("+1", "+2"), "+2");
    }

    #[test]
    fn direction_parses_wire_names() {
        assert_eq!("in".parse::<Direction>().unwrap(), Direction::In);
        assert_eq!("out".parse::<Direction>().unwrap(), Direction::Out);
        assert!("sideways".parse::<Direction>().is_err());
        assert_eq!(serde_json::to_string(&Direction::Out).unwrap(), "\"out\"");
    }

    #[test]
    fn filter_matches_assignment() {
        assert!(ConversationFilter::All.matches(None, 1));
        assert!(ConversationFilter::Mine.matches(Some(1), 1));
        assert!(!ConversationFilter::Mine.matches(Some(2), 1));
        assert!(!ConversationFilter::Mine.matches(None, 1));
        assert!(ConversationFilter::Unassigned.matches(None, 1));
        assert!(!ConversationFilter::Unassigned.matches(Some(1), 1));
    }

    #[test]
    fn subscription_expiry_is_caller_side() {
        let started = Utc::now();
        let sub = Subscription {
            id: 1,
            workspace_id: 1,
            workspace: "acme".into(),
            plan: "pro".into(),
            status: "active".into(),
            started_at: started,
            expires_at: started + Duration::days(30),
        };
        assert!(!sub.is_expired(started + Duration::days(29)));
        assert!(sub.is_expired(started + Duration::days(30)));
    }

    #[test]
    fn totals_use_direction_keys() {
        let json = serde_json::to_value(Totals { inbound: 3, outbound: 4 }).unwrap();
        assert_eq!(json, serde_json::json!({ "in": 3, "out": 4 }));
    }
}
