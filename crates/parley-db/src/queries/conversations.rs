use anyhow::{Result, anyhow};
use chrono::Utc;
use rusqlite::Row;

use parley_types::models::{ConversationFilter, ConversationSummary};

use super::OptionalExt;
use crate::Database;
use crate::models::{ConversationRow, format_timestamp, parse_timestamp};

impl Database {
    // -- Conversations --

    pub fn ensure_conversation(&self, peer: &str) -> Result<ConversationRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO conversations (peer) VALUES (?1) ON CONFLICT(peer) DO NOTHING",
                [peer],
            )?;
            conn.query_row(
                "SELECT id, peer, assigned_user_id, assigned_at FROM conversations WHERE peer = ?1",
                [peer],
                conversation_from_row,
            )
            .optional()?
            .ok_or_else(|| anyhow!("Conversation for {} vanished after insert", peer))
        })
    }

    /// Latest activity per peer, derived from the message log, with the
    /// stored assignment overlaid. Most recent first.
    pub fn list_conversations(
        &self,
        limit: u32,
        filter: ConversationFilter,
        user_id: i64,
    ) -> Result<Vec<ConversationSummary>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT p.peer, p.last_time, c.assigned_user_id
                 FROM (
                     SELECT CASE direction WHEN 'in' THEN from_number ELSE to_number END AS peer,
                            MAX(created_at) AS last_time
                     FROM messages
                     GROUP BY 1
                 ) p
                 LEFT JOIN conversations c ON c.peer = p.peer
                 ORDER BY p.last_time DESC, p.peer ASC",
            )?;

            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                ))
            })?;

            let mut items = Vec::new();
            for row in rows {
                if items.len() >= limit as usize {
                    break;
                }
                let (peer, last_time, assigned_user_id) = row?;
                if !filter.matches(assigned_user_id, user_id) {
                    continue;
                }
                items.push(ConversationSummary {
                    peer,
                    last_time: parse_timestamp(&last_time),
                    assigned_user_id,
                });
            }

            Ok(items)
        })
    }

    pub fn assign_conversation(&self, peer: &str, user_id: i64) -> Result<ConversationRow> {
        let now = format_timestamp(Utc::now());
        self.with_conn(|conn| {
            let row = conn.query_row(
                "INSERT INTO conversations (peer, assigned_user_id, assigned_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(peer) DO UPDATE SET
                     assigned_user_id = excluded.assigned_user_id,
                     assigned_at = excluded.assigned_at
                 RETURNING id, peer, assigned_user_id, assigned_at",
                rusqlite::params![peer, user_id, now],
                conversation_from_row,
            )?;
            Ok(row)
        })
    }

    /// Clear the assignment. `None` when the peer has no conversation row.
    pub fn unassign_conversation(&self, peer: &str) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "UPDATE conversations SET assigned_user_id = NULL, assigned_at = NULL
                 WHERE peer = ?1
                 RETURNING id, peer, assigned_user_id, assigned_at",
                [peer],
                conversation_from_row,
            )
            .optional()
        })
    }
}

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        peer: row.get(1)?,
        assigned_user_id: row.get(2)?,
        assigned_at: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewMessage;
    use chrono::{DateTime, Duration, TimeZone};
    use parley_types::models::Direction;
    use serde_json::json;

    fn message(direction: Direction, peer: &str) -> NewMessage {
        let (from, to) = match direction {
            Direction::In => (peer, "biz"),
            Direction::Out => ("biz", peer),
        };
        NewMessage {
            from_number: from.into(),
            to_number: to.into(),
            direction,
            text: "x".into(),
            meta: json!({}),
        }
    }

    fn peers(items: &[ConversationSummary]) -> Vec<&str> {
        items.iter().map(|c| c.peer.as_str()).collect()
    }

    fn seed(db: &Database) -> DateTime<Utc> {
        let t0 = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap();
        db.save_message_at(&message(Direction::In, "+111"), t0).unwrap();
        db.save_message_at(&message(Direction::Out, "+222"), t0 + Duration::minutes(5)).unwrap();
        db.save_message_at(&message(Direction::In, "+333"), t0 + Duration::minutes(10)).unwrap();
        db.save_message_at(&message(Direction::Out, "+111"), t0 + Duration::minutes(15)).unwrap();
        t0
    }

    #[test]
    fn ensure_conversation_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let a = db.ensure_conversation("+111").unwrap();
        let b = db.ensure_conversation("+111").unwrap();
        assert_eq!(a.id, b.id);
        assert!(b.assigned_user_id.is_none());
    }

    #[test]
    fn listing_orders_by_latest_activity_per_peer() {
        let db = Database::open_in_memory().unwrap();
        let t0 = seed(&db);

        let items = db.list_conversations(200, ConversationFilter::All, 1).unwrap();
        assert_eq!(peers(&items), ["+111", "+333", "+222"]);
        assert_eq!(items[0].last_time, t0 + Duration::minutes(15));

        // Repeated reads with no new messages are identical.
        let again = db.list_conversations(200, ConversationFilter::All, 1).unwrap();
        assert_eq!(items, again);
    }

    #[test]
    fn new_message_moves_peer_to_front() {
        let db = Database::open_in_memory().unwrap();
        let t0 = seed(&db);

        db.save_message_at(&message(Direction::In, "+222"), t0 + Duration::minutes(20)).unwrap();
        let items = db.list_conversations(200, ConversationFilter::All, 1).unwrap();
        assert_eq!(peers(&items), ["+222", "+111", "+333"]);
    }

    #[test]
    fn filters_follow_assignment() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        let me = db.create_user("me@example.com", "h").unwrap().unwrap().id;
        let other = db.create_user("other@example.com", "h").unwrap().unwrap().id;

        let assigned = db.assign_conversation("+333", me).unwrap();
        assert_eq!(assigned.assigned_user_id, Some(me));
        assert!(assigned.assigned_at.is_some());
        db.assign_conversation("+222", other).unwrap();

        let mine = db.list_conversations(200, ConversationFilter::Mine, me).unwrap();
        assert_eq!(peers(&mine), ["+333"]);

        let unassigned = db.list_conversations(200, ConversationFilter::Unassigned, me).unwrap();
        assert_eq!(peers(&unassigned), ["+111"]);

        let cleared = db.unassign_conversation("+333").unwrap().unwrap();
        assert!(cleared.assigned_user_id.is_none());
        assert!(cleared.assigned_at.is_none());

        let unassigned = db.list_conversations(200, ConversationFilter::Unassigned, me).unwrap();
        assert_eq!(peers(&unassigned), ["+111", "+333"]);
    }

    #[test]
    fn reassignment_keeps_one_row() {
        let db = Database::open_in_memory().unwrap();
        let me = db.create_user("me@example.com", "h").unwrap().unwrap().id;
        let first = db.ensure_conversation("+111").unwrap();
        let assigned = db.assign_conversation("+111", me).unwrap();
        assert_eq!(first.id, assigned.id);
    }

    #[test]
    fn unassign_unknown_peer_is_none() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.unassign_conversation("+999").unwrap().is_none());
    }

    #[test]
    fn limit_truncates_after_filtering() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        let items = db.list_conversations(2, ConversationFilter::All, 1).unwrap();
        assert_eq!(peers(&items), ["+111", "+333"]);
    }
}
