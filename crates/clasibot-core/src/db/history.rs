//! Per-company classification history

use chrono::NaiveDate;
use rusqlite::params;

use super::Database;
use crate::error::Result;
use crate::models::ClassifiedHistoryEntry;

impl Database {
    /// Append a confirmed classification to a company's history
    pub fn add_classified_history(&self, entry: &ClassifiedHistoryEntry) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO classified_history (company_id, name, amount, category, date)
            VALUES (?, ?, ?, ?, ?)
            "#,
            params![
                entry.company_id,
                entry.name,
                entry.amount,
                entry.category,
                entry.date.format("%Y-%m-%d").to_string()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// History entries for a company on or after `since`, newest first
    pub fn list_classified_history(
        &self,
        company_id: &str,
        since: NaiveDate,
    ) -> Result<Vec<ClassifiedHistoryEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT company_id, name, amount, category, date
            FROM classified_history
            WHERE company_id = ? AND date >= ?
            ORDER BY date DESC, id DESC
            "#,
        )?;

        let entries = stmt
            .query_map(
                params![company_id, since.format("%Y-%m-%d").to_string()],
                |row| {
                    let date_str: String = row.get(4)?;
                    Ok(ClassifiedHistoryEntry {
                        company_id: row.get(0)?,
                        name: row.get(1)?,
                        amount: row.get(2)?,
                        category: row.get(3)?,
                        date: NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
                            .unwrap_or(since),
                    })
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(entries)
    }
}
