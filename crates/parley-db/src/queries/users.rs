use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};

use super::OptionalExt;
use crate::Database;
use crate::models::{UserRow, WorkspaceRow, format_timestamp};

/// Wrong guesses a reset code tolerates before it is dead.
pub const MAX_RESET_ATTEMPTS: u32 = 5;

impl Database {
    // -- Users --

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, email, password_hash, created_at FROM users WHERE email = ?1",
                [email],
                user_from_row,
            )
            .optional()
        })
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, email, password_hash, created_at FROM users WHERE id = ?1",
                [id],
                user_from_row,
            )
            .optional()
        })
    }

    /// Insert a user. Returns `None` when the email is already registered,
    /// so two racing signups cannot both create a row.
    pub fn create_user(&self, email: &str, password_hash: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "INSERT INTO users (email, password_hash) VALUES (?1, ?2)
                 ON CONFLICT(email) DO NOTHING
                 RETURNING id, email, password_hash, created_at",
                (email, password_hash),
                user_from_row,
            )
            .optional()
        })
    }

    pub fn update_password(&self, user_id: i64, password_hash: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET password_hash = ?2 WHERE id = ?1",
                (user_id, password_hash),
            )?;
            Ok(changed == 1)
        })
    }

    // -- Workspaces --

    pub fn get_workspace_by_owner(&self, owner_user_id: i64) -> Result<Option<WorkspaceRow>> {
        self.with_conn(|conn| query_workspace_by_owner(conn, owner_user_id))
    }

    /// Return the owner's workspace, creating it named after `slug` if absent.
    pub fn ensure_workspace(&self, owner_user_id: i64, slug: &str) -> Result<WorkspaceRow> {
        self.with_conn(|conn| {
            if let Some(ws) = query_workspace_by_owner(conn, owner_user_id)? {
                return Ok(ws);
            }

            conn.execute(
                "INSERT INTO workspaces (slug, name, owner_user_id) VALUES (?1, ?1, ?2)
                 ON CONFLICT(owner_user_id) DO NOTHING",
                (slug, owner_user_id),
            )?;

            query_workspace_by_owner(conn, owner_user_id)?
                .ok_or_else(|| anyhow!("Workspace for user {} vanished after insert", owner_user_id))
        })
    }

    // -- Password resets --

    /// Store a new reset code for `email`. Codes issued earlier and not yet
    /// used are retired, so only the newest one can ever match.
    pub fn create_password_reset(
        &self,
        email: &str,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let now = format_timestamp(Utc::now());
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "UPDATE password_resets SET used_at = ?2 WHERE email = ?1 AND used_at IS NULL",
                (email, &now),
            )?;
            tx.execute(
                "INSERT INTO password_resets (email, code_hash, expires_at) VALUES (?1, ?2, ?3)",
                (email, code_hash, format_timestamp(expires_at)),
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Check `code_hash` against the live reset code for `email` and mark it
    /// used on a match. Every miss counts against the code; after
    /// [`MAX_RESET_ATTEMPTS`] misses it stops matching at all.
    /// Returns true when a code was consumed.
    pub fn consume_password_reset(
        &self,
        email: &str,
        code_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let now = format_timestamp(now);
            let tx = conn.unchecked_transaction()?;

            let live = tx
                .query_row(
                    "SELECT id, code_hash FROM password_resets
                     WHERE email = ?1 AND used_at IS NULL AND expires_at > ?2 AND attempts < ?3
                     ORDER BY id DESC
                     LIMIT 1",
                    rusqlite::params![email, &now, MAX_RESET_ATTEMPTS],
                    |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
                )
                .optional()?;

            let Some((id, stored_hash)) = live else {
                return Ok(false);
            };

            let matched = stored_hash == code_hash;
            if matched {
                tx.execute(
                    "UPDATE password_resets SET used_at = ?2 WHERE id = ?1",
                    (id, &now),
                )?;
            } else {
                tx.execute(
                    "UPDATE password_resets SET attempts = attempts + 1 WHERE id = ?1",
                    [id],
                )?;
            }

            tx.commit()?;
            Ok(matched)
        })
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn query_workspace_by_owner(conn: &Connection, owner_user_id: i64) -> Result<Option<WorkspaceRow>> {
    conn.query_row(
        "SELECT id, slug, name, owner_user_id FROM workspaces WHERE owner_user_id = ?1",
        [owner_user_id],
        |row| {
            Ok(WorkspaceRow {
                id: row.get(0)?,
                slug: row.get(1)?,
                name: row.get(2)?,
                owner_user_id: row.get(3)?,
            })
        },
    )
    .optional()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn duplicate_email_is_not_inserted() {
        let db = Database::open_in_memory().unwrap();
        let first = db.create_user("ann@example.com", "h1").unwrap().unwrap();
        assert!(db.create_user("ann@example.com", "h2").unwrap().is_none());

        let stored = db.get_user_by_email("ann@example.com").unwrap().unwrap();
        assert_eq!(stored.id, first.id);
        assert_eq!(stored.password_hash, "h1");
    }

    #[test]
    fn ensure_workspace_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let user = db.create_user("ann@example.com", "h").unwrap().unwrap();

        let first = db.ensure_workspace(user.id, "ann").unwrap();
        let second = db.ensure_workspace(user.id, "something-else").unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.slug, "ann");
        assert_eq!(second.name, "ann");
    }

    #[test]
    fn reset_code_is_single_use_and_expires() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        db.create_password_reset("ann@example.com", "abc", now + Duration::minutes(15))
            .unwrap();

        assert!(!db.consume_password_reset("ann@example.com", "wrong", now).unwrap());
        assert!(db.consume_password_reset("ann@example.com", "abc", now).unwrap());
        assert!(!db.consume_password_reset("ann@example.com", "abc", now).unwrap());

        db.create_password_reset("ann@example.com", "def", now + Duration::minutes(15))
            .unwrap();
        let later = now + Duration::minutes(16);
        assert!(!db.consume_password_reset("ann@example.com", "def", later).unwrap());
    }

    #[test]
    fn reset_code_dies_after_too_many_misses() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        db.create_password_reset("ann@example.com", "abc", now + Duration::minutes(15))
            .unwrap();

        for _ in 0..MAX_RESET_ATTEMPTS {
            assert!(!db.consume_password_reset("ann@example.com", "guess", now).unwrap());
        }
        assert!(!db.consume_password_reset("ann@example.com", "abc", now).unwrap());
    }

    #[test]
    fn new_reset_code_retires_older_ones() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let expires = now + Duration::minutes(15);
        db.create_password_reset("ann@example.com", "first", expires).unwrap();
        db.create_password_reset("ann@example.com", "second", expires).unwrap();

        assert!(!db.consume_password_reset("ann@example.com", "first", now).unwrap());
        assert!(db.consume_password_reset("ann@example.com", "second", now).unwrap());
    }

    #[test]
    fn update_password_replaces_hash() {
        let db = Database::open_in_memory().unwrap();
        let user = db.create_user("ann@example.com", "old").unwrap().unwrap();
        assert!(db.update_password(user.id, "new").unwrap());
        assert_eq!(db.get_user_by_id(user.id).unwrap().unwrap().password_hash, "new");
        assert!(!db.update_password(9999, "x").unwrap());
    }
}
