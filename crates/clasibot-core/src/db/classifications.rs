//! Transaction classification records
//!
//! Each confirmed classification bumps the count of a `(name, category)` pair.
//! Counts only grow; retired categories stay in storage and are filtered out
//! against the caller's valid set at read time.

use rusqlite::params;

use super::Database;
use crate::error::Result;
use crate::models::{normalize_name, Category, CategoryCount, TransactionClassificationRecord};

impl Database {
    /// Load the record for a transaction name, if any confirmations exist
    pub fn get_classification_record(
        &self,
        name: &str,
    ) -> Result<Option<TransactionClassificationRecord>> {
        let key = normalize_name(name);
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT category, count
            FROM transaction_classifications
            WHERE name = ?
            ORDER BY count DESC, category ASC
            "#,
        )?;

        let categories = stmt
            .query_map(params![key], |row| {
                Ok(CategoryCount {
                    category: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        if categories.is_empty() {
            return Ok(None);
        }

        Ok(Some(TransactionClassificationRecord {
            name: key,
            categories,
        }))
    }

    /// Most frequently confirmed categories for a name, restricted to `valid`
    ///
    /// Sorted by count descending and capped at `limit`. Entries whose category
    /// is not in `valid` are skipped.
    pub fn top_categories_for(
        &self,
        name: &str,
        valid: &[Category],
        limit: usize,
    ) -> Result<Vec<Category>> {
        let Some(record) = self.get_classification_record(name)? else {
            return Ok(Vec::new());
        };

        let mut result: Vec<Category> = Vec::new();
        for entry in record.categories.iter().filter(|e| e.count > 0) {
            let found = valid
                .iter()
                .find(|c| c.name.trim().eq_ignore_ascii_case(entry.category.trim()));
            if let Some(category) = found {
                if !result.iter().any(|c| c.id == category.id) {
                    result.push(category.clone());
                }
            }
            if result.len() >= limit {
                break;
            }
        }

        Ok(result)
    }

    /// Increment the count for a confirmed `(name, category)` pair
    ///
    /// Returns the new count.
    pub fn record_confirmed_classification(&self, name: &str, category: &str) -> Result<i64> {
        let key = normalize_name(name);
        let conn = self.conn()?;
        let count = conn.query_row(
            r#"
            INSERT INTO transaction_classifications (name, category, count)
            VALUES (?, ?, 1)
            ON CONFLICT(name, category) DO UPDATE SET
                count = count + 1,
                updated_at = CURRENT_TIMESTAMP
            RETURNING count
            "#,
            params![key, category.trim()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
