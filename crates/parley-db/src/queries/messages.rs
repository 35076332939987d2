use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Row;

use crate::Database;
use crate::models::{ContactRow, MessageRow, NewMessage, format_timestamp};

/// Upper bound on a single message page.
pub const MAX_MESSAGE_PAGE: u32 = 500;

impl Database {
    // -- Messages --

    pub fn save_message(&self, message: &NewMessage) -> Result<MessageRow> {
        self.save_message_at(message, Utc::now())
    }

    /// Append a message with an explicit timestamp (bridges report when a
    /// message was actually received).
    pub fn save_message_at(&self, message: &NewMessage, at: DateTime<Utc>) -> Result<MessageRow> {
        let meta = serde_json::to_string(&message.meta)?;
        self.with_conn(|conn| {
            let row = conn.query_row(
                "INSERT INTO messages (from_number, to_number, direction, text, meta, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 RETURNING id, from_number, to_number, direction, text, meta, created_at",
                rusqlite::params![
                    message.from_number,
                    message.to_number,
                    message.direction.as_str(),
                    message.text,
                    meta,
                    format_timestamp(at),
                ],
                message_from_row,
            )?;
            Ok(row)
        })
    }

    /// Newest first. With `peer`, only messages exchanged with that number.
    pub fn get_messages(&self, limit: u32, peer: Option<&str>) -> Result<Vec<MessageRow>> {
        let limit = limit.min(MAX_MESSAGE_PAGE);
        self.with_conn(|conn| {
            let rows = match peer {
                Some(peer) => {
                    let mut stmt = conn.prepare(
                        "SELECT id, from_number, to_number, direction, text, meta, created_at
                         FROM messages
                         WHERE from_number = ?1 OR to_number = ?1
                         ORDER BY created_at DESC, id DESC
                         LIMIT ?2",
                    )?;
                    stmt.query_map(rusqlite::params![peer, limit], message_from_row)?
                        .collect::<std::result::Result<Vec<_>, _>>()?
                }
                None => {
                    let mut stmt = conn.prepare(
                        "SELECT id, from_number, to_number, direction, text, meta, created_at
                         FROM messages
                         ORDER BY created_at DESC, id DESC
                         LIMIT ?1",
                    )?;
                    stmt.query_map([limit], message_from_row)?
                        .collect::<std::result::Result<Vec<_>, _>>()?
                }
            };
            Ok(rows)
        })
    }

    // -- Contacts --

    /// Return the contact id for `phone`, creating the contact if needed.
    /// An existing contact keeps its name unless it had none.
    pub fn upsert_contact(&self, phone: &str, name: Option<&str>) -> Result<i64> {
        self.with_conn(|conn| {
            let id = conn.query_row(
                "INSERT INTO contacts (phone, name) VALUES (?1, ?2)
                 ON CONFLICT(phone) DO UPDATE SET name = COALESCE(contacts.name, excluded.name)
                 RETURNING id",
                rusqlite::params![phone, name],
                |row| row.get(0),
            )?;
            Ok(id)
        })
    }

    pub fn list_contacts(&self, limit: u32) -> Result<Vec<ContactRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, phone, name, created_at FROM contacts ORDER BY id DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map([limit], |row| {
                    Ok(ContactRow {
                        id: row.get(0)?,
                        phone: row.get(1)?,
                        name: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        from_number: row.get(1)?,
        to_number: row.get(2)?,
        direction: row.get(3)?,
        text: row.get(4)?,
        meta: row.get(5)?,
        created_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use parley_types::models::{Direction, Message};
    use serde_json::json;

    fn inbound(from: &str, text: &str) -> NewMessage {
        NewMessage {
            from_number: from.into(),
            to_number: "biz".into(),
            direction: Direction::In,
            text: text.into(),
            meta: json!({ "source": "test" }),
        }
    }

    fn outbound(to: &str, text: &str) -> NewMessage {
        NewMessage {
            from_number: "biz".into(),
            to_number: to.into(),
            direction: Direction::Out,
            text: text.into(),
            meta: json!({}),
        }
    }

    #[test]
    fn saved_message_converts_back() {
        let db = Database::open_in_memory().unwrap();
        let row = db.save_message(&inbound("+111", "hello")).unwrap();
        let msg = Message::from(row);
        assert_eq!(msg.direction, Direction::In);
        assert_eq!(msg.peer(), "+111");
        assert_eq!(msg.meta, json!({ "source": "test" }));
    }

    #[test]
    fn messages_newest_first_and_filtered_by_peer() {
        let db = Database::open_in_memory().unwrap();
        let t0 = Utc::now() - Duration::minutes(10);
        db.save_message_at(&inbound("+111", "a"), t0).unwrap();
        db.save_message_at(&outbound("+222", "b"), t0 + Duration::minutes(1)).unwrap();
        db.save_message_at(&outbound("+111", "c"), t0 + Duration::minutes(2)).unwrap();

        let all = db.get_messages(200, None).unwrap();
        let texts: Vec<_> = all.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["c", "b", "a"]);

        let thread = db.get_messages(200, Some("+111")).unwrap();
        let texts: Vec<_> = thread.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["c", "a"]);

        assert_eq!(db.get_messages(1, None).unwrap().len(), 1);
    }

    #[test]
    fn upsert_contact_keeps_one_row_per_phone() {
        let db = Database::open_in_memory().unwrap();
        let first = db.upsert_contact("+111", None).unwrap();
        let second = db.upsert_contact("+111", Some("Ann")).unwrap();
        let third = db.upsert_contact("+111", Some("Someone Else")).unwrap();
        assert_eq!(first, second);
        assert_eq!(second, third);

        let contacts = db.list_contacts(10).unwrap();
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].name.as_deref(), Some("Ann"));
    }
}
