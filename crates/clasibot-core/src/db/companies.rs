//! Tenant company registry

use rusqlite::{params, OptionalExtension, Row};

use super::Database;
use crate::error::{Error, Result};
use crate::models::{Company, NewCompany};

fn company_from_row(row: &Row<'_>) -> rusqlite::Result<Company> {
    Ok(Company {
        company_id: row.get(0)?,
        name: row.get(1)?,
        firm_name: row.get(2)?,
        industry: row.get(3)?,
        bookkeeper_connected: row.get(4)?,
        classification_failed: row.get(5)?,
    })
}

const COMPANY_COLUMNS: &str =
    "company_id, name, firm_name, industry, bookkeeper_connected, classification_failed";

impl Database {
    /// Register a company or update its details
    pub fn upsert_company(&self, company: &NewCompany) -> Result<()> {
        if company.company_id.trim().is_empty() {
            return Err(Error::InvalidData("company_id must not be empty".into()));
        }

        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO companies (company_id, name, firm_name, industry, bookkeeper_connected)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(company_id) DO UPDATE SET
                name = excluded.name,
                firm_name = excluded.firm_name,
                industry = excluded.industry,
                bookkeeper_connected = excluded.bookkeeper_connected,
                updated_at = CURRENT_TIMESTAMP
            "#,
            params![
                company.company_id,
                company.name,
                company.firm_name,
                company.industry,
                company.bookkeeper_connected
            ],
        )?;
        Ok(())
    }

    pub fn get_company(&self, company_id: &str) -> Result<Option<Company>> {
        let conn = self.conn()?;
        let company = conn
            .query_row(
                &format!("SELECT {} FROM companies WHERE company_id = ?", COMPANY_COLUMNS),
                params![company_id],
                company_from_row,
            )
            .optional()?;
        Ok(company)
    }

    pub fn list_companies(&self) -> Result<Vec<Company>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM companies ORDER BY name, company_id",
            COMPANY_COLUMNS
        ))?;
        let companies = stmt
            .query_map([], company_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(companies)
    }

    /// Companies the synthetic bookkeeper can access
    pub fn list_connected_companies(&self) -> Result<Vec<Company>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM companies WHERE bookkeeper_connected = 1 ORDER BY company_id",
            COMPANY_COLUMNS
        ))?;
        let companies = stmt
            .query_map([], company_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(companies)
    }

    pub fn set_bookkeeper_connected(&self, company_id: &str, connected: bool) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE companies SET bookkeeper_connected = ?, updated_at = CURRENT_TIMESTAMP WHERE company_id = ?",
            params![connected, company_id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("Company {}", company_id)));
        }
        Ok(())
    }

    /// Flag (or clear) a failed scheduled classification for a company
    pub fn set_classification_failed(&self, company_id: &str, failed: bool) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE companies SET classification_failed = ?, updated_at = CURRENT_TIMESTAMP WHERE company_id = ?",
            params![failed, company_id],
        )?;
        Ok(())
    }
}
