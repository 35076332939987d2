use anyhow::Result;
use chrono::Utc;
use rusqlite::Row;

use parley_types::flow::FlowDocument;

use super::OptionalExt;
use crate::Database;
use crate::models::{AutomationRow, TemplateRow, format_timestamp};

impl Database {
    // -- Templates --

    pub fn create_template(
        &self,
        name: &str,
        category: Option<&str>,
        content: &str,
    ) -> Result<TemplateRow> {
        let now = format_timestamp(Utc::now());
        self.with_conn(|conn| {
            let row = conn.query_row(
                "INSERT INTO templates (name, category, content, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 RETURNING id, name, category, content, created_at, updated_at",
                rusqlite::params![name, category, content, now],
                template_from_row,
            )?;
            Ok(row)
        })
    }

    /// Most recently edited first.
    pub fn list_templates(&self, limit: u32) -> Result<Vec<TemplateRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, category, content, created_at, updated_at
                 FROM templates
                 ORDER BY updated_at DESC, id DESC
                 LIMIT ?1",
            )?;
            let rows = stmt
                .query_map([limit], template_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_template(&self, id: i64) -> Result<Option<TemplateRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name, category, content, created_at, updated_at FROM templates WHERE id = ?1",
                [id],
                template_from_row,
            )
            .optional()
        })
    }

    /// Replace name, category and content. `None` when the template is gone.
    pub fn update_template(
        &self,
        id: i64,
        name: &str,
        category: Option<&str>,
        content: &str,
    ) -> Result<Option<TemplateRow>> {
        let now = format_timestamp(Utc::now());
        self.with_conn(|conn| {
            conn.query_row(
                "UPDATE templates SET name = ?2, category = ?3, content = ?4, updated_at = ?5
                 WHERE id = ?1
                 RETURNING id, name, category, content, created_at, updated_at",
                rusqlite::params![id, name, category, content, now],
                template_from_row,
            )
            .optional()
        })
    }

    pub fn delete_template(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM templates WHERE id = ?1", [id])?;
            Ok(deleted == 1)
        })
    }

    // -- Automations --

    pub fn create_automation(&self, name: &str, flow: &FlowDocument) -> Result<AutomationRow> {
        let flow_json = serde_json::to_string(flow)?;
        let now = format_timestamp(Utc::now());
        self.with_conn(|conn| {
            let row = conn.query_row(
                "INSERT INTO automations (name, flow_json, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)
                 RETURNING id, name, flow_json, created_at, updated_at",
                rusqlite::params![name, flow_json, now],
                automation_from_row,
            )?;
            Ok(row)
        })
    }

    pub fn list_automations(&self, limit: u32) -> Result<Vec<AutomationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, flow_json, created_at, updated_at
                 FROM automations
                 ORDER BY updated_at DESC, id DESC
                 LIMIT ?1",
            )?;
            let rows = stmt
                .query_map([limit], automation_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_automation(&self, id: i64) -> Result<Option<AutomationRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name, flow_json, created_at, updated_at FROM automations WHERE id = ?1",
                [id],
                automation_from_row,
            )
            .optional()
        })
    }

    /// Whole-document replacement; the last writer wins.
    pub fn update_automation(
        &self,
        id: i64,
        name: &str,
        flow: &FlowDocument,
    ) -> Result<Option<AutomationRow>> {
        let flow_json = serde_json::to_string(flow)?;
        let now = format_timestamp(Utc::now());
        self.with_conn(|conn| {
            conn.query_row(
                "UPDATE automations SET name = ?2, flow_json = ?3, updated_at = ?4
                 WHERE id = ?1
                 RETURNING id, name, flow_json, created_at, updated_at",
                rusqlite::params![id, name, flow_json, now],
                automation_from_row,
            )
            .optional()
        })
    }

    pub fn delete_automation(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM automations WHERE id = ?1", [id])?;
            Ok(deleted == 1)
        })
    }
}

fn template_from_row(row: &Row<'_>) -> rusqlite::Result<TemplateRow> {
    Ok(TemplateRow {
        id: row.get(0)?,
        name: row.get(1)?,
        category: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn automation_from_row(row: &Row<'_>) -> rusqlite::Result<AutomationRow> {
    Ok(AutomationRow {
        id: row.get(0)?,
        name: row.get(1)?,
        flow_json: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}
