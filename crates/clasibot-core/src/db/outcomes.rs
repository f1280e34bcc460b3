//! Job log of scheduled runs

use rusqlite::{params, OptionalExtension, Row};

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::{CompanyOutcome, JobStatus};

fn outcome_from_row(row: &Row<'_>) -> rusqlite::Result<CompanyOutcome> {
    let status_str: String = row.get(2)?;
    let finished_at_str: String = row.get(8)?;
    let completed_chunks: i64 = row.get(5)?;
    let max_chunks: i64 = row.get(6)?;
    let classified: i64 = row.get(7)?;

    Ok(CompanyOutcome {
        run_id: row.get(0)?,
        company_id: row.get(1)?,
        status: status_str.parse().unwrap_or(JobStatus::Failed),
        message: row.get(3)?,
        detail: row.get(4)?,
        completed_chunks: completed_chunks.max(0) as usize,
        max_chunks: max_chunks.max(0) as usize,
        classified: classified.max(0) as usize,
        finished_at: parse_datetime(&finished_at_str),
    })
}

const OUTCOME_COLUMNS: &str =
    "run_id, company_id, status, message, detail, completed_chunks, max_chunks, classified, finished_at";

impl Database {
    pub fn record_company_outcome(&self, outcome: &CompanyOutcome) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO job_outcomes
                (run_id, company_id, status, message, detail, completed_chunks, max_chunks, classified, finished_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                outcome.run_id,
                outcome.company_id,
                outcome.status.as_str(),
                outcome.message,
                outcome.detail,
                outcome.completed_chunks as i64,
                outcome.max_chunks as i64,
                outcome.classified as i64,
                outcome.finished_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn list_run_outcomes(&self, run_id: &str) -> Result<Vec<CompanyOutcome>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM job_outcomes WHERE run_id = ? ORDER BY id",
            OUTCOME_COLUMNS
        ))?;
        let outcomes = stmt
            .query_map(params![run_id], outcome_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(outcomes)
    }

    /// Run id of the most recently logged outcome
    pub fn latest_run_id(&self) -> Result<Option<String>> {
        let conn = self.conn()?;
        let run_id = conn
            .query_row(
                "SELECT run_id FROM job_outcomes ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(run_id)
    }

    /// Most recent outcomes for one company, newest first
    pub fn list_company_outcomes(&self, company_id: &str, limit: i64) -> Result<Vec<CompanyOutcome>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM job_outcomes WHERE company_id = ? ORDER BY id DESC LIMIT ?",
            OUTCOME_COLUMNS
        ))?;
        let outcomes = stmt
            .query_map(params![company_id, limit], outcome_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(outcomes)
    }
}
