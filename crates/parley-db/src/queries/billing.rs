use anyhow::{Result, anyhow};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, Row};

use super::OptionalExt;
use crate::Database;
use crate::models::{InvoiceRow, NewInvoice, SubscriptionRow, format_timestamp};

/// Billing months are a fixed 30 days, not calendar months.
pub const DAYS_PER_BILLING_MONTH: i64 = 30;

/// Longest period a single payment may buy.
pub const MAX_BILLING_MONTHS: u32 = 120;

const INVOICE_COLUMNS: &str =
    "id, invoice_id, workspace_id, workspace, plan, amount, currency, status, created_at, paid_at";

const SUBSCRIPTION_COLUMNS: &str =
    "id, workspace_id, workspace, plan, status, started_at, expires_at";

/// End of a subscription of `months` billing months starting at `started_at`.
pub fn subscription_expiry(started_at: DateTime<Utc>, months: u32) -> Result<DateTime<Utc>> {
    Duration::try_days(DAYS_PER_BILLING_MONTH * i64::from(months))
        .and_then(|period| started_at.checked_add_signed(period))
        .ok_or_else(|| anyhow!("subscription of {} months is out of range", months))
}

impl Database {
    // -- Invoices --

    pub fn create_invoice(&self, invoice: &NewInvoice) -> Result<InvoiceRow> {
        let now = format_timestamp(Utc::now());
        self.with_conn(|conn| {
            let row = conn.query_row(
                &format!(
                    "INSERT INTO invoices
                         (invoice_id, workspace_id, workspace, plan, amount, currency, status, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7)
                     RETURNING {INVOICE_COLUMNS}"
                ),
                rusqlite::params![
                    invoice.invoice_id,
                    invoice.workspace_id,
                    invoice.workspace,
                    invoice.plan,
                    invoice.amount,
                    invoice.currency,
                    now,
                ],
                invoice_from_row,
            )?;
            Ok(row)
        })
    }

    pub fn get_invoice(&self, invoice_id: &str) -> Result<Option<InvoiceRow>> {
        self.with_conn(|conn| query_invoice(conn, invoice_id))
    }

    /// A workspace's invoices, newest first.
    pub fn list_invoices(&self, workspace_id: i64, limit: u32) -> Result<Vec<InvoiceRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {INVOICE_COLUMNS}
                 FROM invoices
                 WHERE workspace_id = ?1
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?2"
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![workspace_id, limit], invoice_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Move an invoice from pending to paid.
    /// Returns (row, transitioned); transitioned=false means it was already paid.
    /// `None` when no invoice has this id.
    pub fn mark_invoice_paid(&self, invoice_id: &str) -> Result<Option<(InvoiceRow, bool)>> {
        let now = format_timestamp(Utc::now());
        self.with_conn(|conn| {
            let transitioned = mark_paid(conn, invoice_id, &now)?;
            Ok(query_invoice(conn, invoice_id)?.map(|row| (row, transitioned)))
        })
    }

    /// Mark an invoice paid and, on the first transition only, open a
    /// subscription for its workspace. Both writes commit together.
    ///
    /// `None` when no invoice has this id. The subscription is `None` when
    /// the invoice was already paid.
    pub fn settle_invoice(
        &self,
        invoice_id: &str,
        months: u32,
    ) -> Result<Option<(InvoiceRow, Option<SubscriptionRow>)>> {
        let now = Utc::now();
        let expires_at = subscription_expiry(now, months)?;
        let paid_at = format_timestamp(now);

        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;

            if !mark_paid(&tx, invoice_id, &paid_at)? {
                return Ok(query_invoice(&tx, invoice_id)?.map(|row| (row, None)));
            }

            let invoice = query_invoice(&tx, invoice_id)?
                .ok_or_else(|| anyhow!("Invoice {} vanished after update", invoice_id))?;
            let subscription = insert_subscription(
                &tx,
                invoice.workspace_id,
                &invoice.workspace,
                &invoice.plan,
                now,
                expires_at,
            )?;

            tx.commit()?;
            Ok(Some((invoice, Some(subscription))))
        })
    }

    // -- Subscriptions --

    pub fn create_subscription(
        &self,
        workspace_id: i64,
        workspace: &str,
        plan: &str,
        months: u32,
    ) -> Result<SubscriptionRow> {
        self.create_subscription_at(workspace_id, workspace, plan, months, Utc::now())
    }

    pub fn create_subscription_at(
        &self,
        workspace_id: i64,
        workspace: &str,
        plan: &str,
        months: u32,
        started_at: DateTime<Utc>,
    ) -> Result<SubscriptionRow> {
        let expires_at = subscription_expiry(started_at, months)?;
        self.with_conn(|conn| {
            insert_subscription(conn, workspace_id, workspace, plan, started_at, expires_at)
        })
    }

    /// The most recently created subscription for a workspace.
    pub fn current_subscription(&self, workspace_id: i64) -> Result<Option<SubscriptionRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {SUBSCRIPTION_COLUMNS}
                     FROM subscriptions
                     WHERE workspace_id = ?1
                     ORDER BY id DESC
                     LIMIT 1"
                ),
                [workspace_id],
                subscription_from_row,
            )
            .optional()
        })
    }
}

/// True when this call moved the invoice out of pending.
fn mark_paid(conn: &Connection, invoice_id: &str, paid_at: &str) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE invoices SET status = 'paid', paid_at = ?2
         WHERE invoice_id = ?1 AND status = 'pending'",
        (invoice_id, paid_at),
    )?;
    Ok(changed == 1)
}

fn insert_subscription(
    conn: &Connection,
    workspace_id: i64,
    workspace: &str,
    plan: &str,
    started_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<SubscriptionRow> {
    let row = conn.query_row(
        &format!(
            "INSERT INTO subscriptions (workspace_id, workspace, plan, status, started_at, expires_at)
             VALUES (?1, ?2, ?3, 'active', ?4, ?5)
             RETURNING {SUBSCRIPTION_COLUMNS}"
        ),
        rusqlite::params![
            workspace_id,
            workspace,
            plan,
            format_timestamp(started_at),
            format_timestamp(expires_at),
        ],
        subscription_from_row,
    )?;
    Ok(row)
}

fn query_invoice(conn: &Connection, invoice_id: &str) -> Result<Option<InvoiceRow>> {
    conn.query_row(
        &format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE invoice_id = ?1"),
        [invoice_id],
        invoice_from_row,
    )
    .optional()
}

fn invoice_from_row(row: &Row<'_>) -> rusqlite::Result<InvoiceRow> {
    Ok(InvoiceRow {
        id: row.get(0)?,
        invoice_id: row.get(1)?,
        workspace_id: row.get(2)?,
        workspace: row.get(3)?,
        plan: row.get(4)?,
        amount: row.get(5)?,
        currency: row.get(6)?,
        status: row.get(7)?,
        created_at: row.get(8)?,
        paid_at: row.get(9)?,
    })
}

fn subscription_from_row(row: &Row<'_>) -> rusqlite::Result<SubscriptionRow> {
    Ok(SubscriptionRow {
        id: row.get(0)?,
        workspace_id: row.get(1)?,
        workspace: row.get(2)?,
        plan: row.get(3)?,
        status: row.get(4)?,
        started_at: row.get(5)?,
        expires_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use parley_types::models::{Invoice, InvoiceStatus, Subscription};

    use crate::models::WorkspaceRow;

    fn workspace(db: &Database, email: &str, slug: &str) -> WorkspaceRow {
        let user = db.create_user(email, "h").unwrap().unwrap();
        db.ensure_workspace(user.id, slug).unwrap()
    }

    fn invoice(ws: &WorkspaceRow, id: &str) -> NewInvoice {
        NewInvoice {
            invoice_id: id.into(),
            workspace_id: ws.id,
            workspace: ws.slug.clone(),
            plan: "pro".into(),
            amount: 29.0,
            currency: "USD".into(),
        }
    }

    #[test]
    fn invoice_starts_pending() {
        let db = Database::open_in_memory().unwrap();
        let ws = workspace(&db, "acme@example.com", "acme");
        let row = db.create_invoice(&invoice(&ws, "inv-1")).unwrap();
        let inv = Invoice::from(row);
        assert_eq!(inv.status, InvoiceStatus::Pending);
        assert_eq!(inv.workspace_id, ws.id);
        assert!(inv.paid_at.is_none());
    }

    #[test]
    fn invoice_id_is_unique() {
        let db = Database::open_in_memory().unwrap();
        let ws = workspace(&db, "acme@example.com", "acme");
        db.create_invoice(&invoice(&ws, "inv-1")).unwrap();
        assert!(db.create_invoice(&invoice(&ws, "inv-1")).is_err());
    }

    #[test]
    fn invoices_are_listed_per_workspace() {
        let db = Database::open_in_memory().unwrap();
        let a = workspace(&db, "ann@x.com", "ann");
        let b = workspace(&db, "ann@y.com", "ann");
        db.create_invoice(&invoice(&a, "inv-a")).unwrap();
        db.create_invoice(&invoice(&b, "inv-b")).unwrap();

        let listed = db.list_invoices(a.id, 50).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].invoice_id, "inv-a");
    }

    #[test]
    fn mark_paid_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let ws = workspace(&db, "acme@example.com", "acme");
        db.create_invoice(&invoice(&ws, "inv-1")).unwrap();

        let (first, transitioned) = db.mark_invoice_paid("inv-1").unwrap().unwrap();
        assert!(transitioned);
        assert_eq!(first.status, "paid");

        let (second, transitioned) = db.mark_invoice_paid("inv-1").unwrap().unwrap();
        assert!(!transitioned);
        assert_eq!(second.status, "paid");
        assert_eq!(second.paid_at, first.paid_at);

        assert!(db.mark_invoice_paid("missing").unwrap().is_none());
    }

    #[test]
    fn settle_subscribes_once() {
        let db = Database::open_in_memory().unwrap();
        let ws = workspace(&db, "acme@example.com", "acme");
        db.create_invoice(&invoice(&ws, "inv-1")).unwrap();

        let (paid, sub) = db.settle_invoice("inv-1", 2).unwrap().unwrap();
        assert_eq!(paid.status, "paid");
        let sub = Subscription::from(sub.unwrap());
        assert_eq!(sub.workspace_id, ws.id);
        assert_eq!(sub.expires_at - sub.started_at, Duration::days(60));

        let (again, sub) = db.settle_invoice("inv-1", 2).unwrap().unwrap();
        assert_eq!(again.status, "paid");
        assert!(sub.is_none());

        assert!(db.settle_invoice("missing", 1).unwrap().is_none());
    }

    #[test]
    fn settle_with_overflowing_period_leaves_invoice_pending() {
        let db = Database::open_in_memory().unwrap();
        let ws = workspace(&db, "acme@example.com", "acme");
        db.create_invoice(&invoice(&ws, "inv-1")).unwrap();

        assert!(db.settle_invoice("inv-1", u32::MAX).is_err());
        assert_eq!(db.get_invoice("inv-1").unwrap().unwrap().status, "pending");

        // A sane retry still subscribes.
        let (_, sub) = db.settle_invoice("inv-1", 1).unwrap().unwrap();
        assert!(sub.is_some());
    }

    #[test]
    fn expiry_overflow_is_an_error() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert!(subscription_expiry(start, 4_000_000).is_err());
        assert!(subscription_expiry(start, MAX_BILLING_MONTHS).is_ok());
    }

    #[test]
    fn subscription_expiry_uses_thirty_day_months() {
        let db = Database::open_in_memory().unwrap();
        let ws = workspace(&db, "acme@example.com", "acme");
        let start = Utc.with_ymd_and_hms(2026, 1, 31, 0, 0, 0).unwrap();
        let sub = Subscription::from(
            db.create_subscription_at(ws.id, &ws.slug, "pro", 3, start).unwrap(),
        );

        assert_eq!(sub.status, "active");
        assert_eq!(sub.started_at, start);
        assert_eq!(sub.expires_at, Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn current_subscription_is_latest_row_of_the_workspace() {
        let db = Database::open_in_memory().unwrap();
        let acme = workspace(&db, "acme@example.com", "acme");
        let other = workspace(&db, "acme@other.com", "acme");
        assert!(db.current_subscription(acme.id).unwrap().is_none());

        db.create_subscription(acme.id, "acme", "basic", 1).unwrap();
        let latest = db.create_subscription(acme.id, "acme", "pro", 12).unwrap();
        db.create_subscription(other.id, "acme", "basic", 1).unwrap();

        let current = db.current_subscription(acme.id).unwrap().unwrap();
        assert_eq!(current.id, latest.id);
        assert_eq!(current.plan, "pro");
        assert!(db.current_subscription(other.id).unwrap().unwrap().id > latest.id);
    }
}
