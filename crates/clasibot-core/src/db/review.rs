//! Next scheduled review timestamp

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension};

use super::{parse_datetime, Database};
use crate::error::Result;

impl Database {
    /// Stored next review timestamp, if one has been written
    pub fn get_next_review(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn()?;
        let stored: Option<String> = conn
            .query_row(
                "SELECT next_review_at FROM next_review WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(stored.map(|s| parse_datetime(&s)))
    }

    /// Overwrite the next review timestamp
    pub fn set_next_review(&self, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO next_review (id, next_review_at) VALUES (1, ?)
            ON CONFLICT(id) DO UPDATE SET
                next_review_at = excluded.next_review_at,
                updated_at = CURRENT_TIMESTAMP
            "#,
            params![at.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Stored next review timestamp, creating `now + interval_days` when absent
    pub fn get_or_init_next_review(&self, interval_days: i64) -> Result<DateTime<Utc>> {
        if let Some(at) = self.get_next_review()? {
            return Ok(at);
        }
        let at = Utc::now() + Duration::days(interval_days);
        self.set_next_review(at)?;
        Ok(at)
    }
}
