use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use parley_types::models::{DayCount, Direction, Totals, TopContact};

use crate::Database;
use crate::models::format_timestamp;

impl Database {
    // -- Analytics --

    pub fn get_totals(&self) -> Result<Totals> {
        self.with_conn(|conn| {
            let (inbound, outbound): (i64, i64) = conn.query_row(
                "SELECT COALESCE(SUM(direction = 'in'), 0), COALESCE(SUM(direction = 'out'), 0)
                 FROM messages",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            Ok(Totals {
                inbound: inbound as u64,
                outbound: outbound as u64,
            })
        })
    }

    /// Per-day in/out counts over the trailing `days` days, oldest day first.
    pub fn get_counts_by_day(&self, days: u32) -> Result<Vec<DayCount>> {
        self.get_counts_by_day_at(days, Utc::now())
    }

    pub fn get_counts_by_day_at(&self, days: u32, now: DateTime<Utc>) -> Result<Vec<DayCount>> {
        let since = format_timestamp(now - Duration::days(i64::from(days)));
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT created_at, direction FROM messages WHERE created_at >= ?1",
            )?;
            let rows = stmt
                .query_map([&since], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let parsed = rows.into_iter().filter_map(|(created_at, direction)| {
                match direction.parse::<Direction>() {
                    Ok(direction) => Some((created_at, direction)),
                    Err(e) => {
                        warn!("Skipping message with {}", e);
                        None
                    }
                }
            });

            Ok(bucket_by_day(parsed))
        })
    }

    /// Peers with the most messages in either direction.
    pub fn get_top_contacts(&self, limit: u32) -> Result<Vec<TopContact>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT CASE direction WHEN 'in' THEN from_number ELSE to_number END AS peer,
                        COUNT(*) AS n
                 FROM messages
                 GROUP BY 1
                 ORDER BY n DESC, peer ASC
                 LIMIT ?1",
            )?;
            let rows = stmt
                .query_map([limit], |row| {
                    Ok(TopContact {
                        peer: row.get(0)?,
                        count: row.get::<_, i64>(1)? as u64,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

/// Group `(timestamp, direction)` pairs by the UTC date prefix of the
/// timestamp. Days without messages do not appear.
pub fn bucket_by_day<I>(messages: I) -> Vec<DayCount>
where
    I: IntoIterator<Item = (String, Direction)>,
{
    let mut buckets: BTreeMap<String, (u64, u64)> = BTreeMap::new();
    for (created_at, direction) in messages {
        let day = created_at.get(..10).unwrap_or(&created_at).to_string();
        let counts = buckets.entry(day).or_default();
        match direction {
            Direction::In => counts.0 += 1,
            Direction::Out => counts.1 += 1,
        }
    }

    buckets
        .into_iter()
        .map(|(date, (inbound, outbound))| DayCount {
            date,
            inbound,
            outbound,
        })
        .collect()
}
