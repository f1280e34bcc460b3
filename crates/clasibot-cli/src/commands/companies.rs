//! Company registry commands

use anyhow::{bail, Result};
use clasibot_core::db::Database;
use clasibot_core::NewCompany;

use super::truncate;

pub fn cmd_companies_list(db: &Database) -> Result<()> {
    let companies = db.list_companies()?;

    if companies.is_empty() {
        println!("No companies registered. Add one with: clasibot companies add <ID> --name <NAME>");
        return Ok(());
    }

    println!(
        "{:<20} {:<30} {:<20} {:<10} {}",
        "ID", "Name", "Firm", "Connected", "Last run"
    );
    println!("{}", "─".repeat(92));
    for company in companies {
        let connected = if company.bookkeeper_connected { "yes" } else { "no" };
        let last_run = if company.classification_failed {
            "failed"
        } else {
            "ok"
        };
        println!(
            "{:<20} {:<30} {:<20} {:<10} {}",
            truncate(&company.company_id, 20),
            truncate(&company.name, 30),
            truncate(company.firm_name.as_deref().unwrap_or("-"), 20),
            connected,
            last_run
        );
    }
    Ok(())
}

/// Register a company, keeping its connection state when it already exists
pub fn cmd_companies_add(
    db: &Database,
    company_id: &str,
    name: &str,
    firm_name: Option<&str>,
    industry: Option<&str>,
) -> Result<()> {
    let existing = db.get_company(company_id)?;
    let connected = existing.as_ref().is_some_and(|c| c.bookkeeper_connected);

    db.upsert_company(&NewCompany {
        company_id: company_id.to_string(),
        name: name.to_string(),
        firm_name: firm_name.map(str::to_string),
        industry: industry.map(str::to_string),
        bookkeeper_connected: connected,
    })?;

    if existing.is_some() {
        println!("✓ Updated company {} ({})", name, company_id);
    } else {
        println!("✓ Registered company {} ({})", name, company_id);
        println!("  Mark it connected once the bookkeeper invite is accepted:");
        println!("  clasibot companies connect {}", company_id);
    }
    Ok(())
}

pub fn cmd_companies_connect(db: &Database, company_id: &str, connected: bool) -> Result<()> {
    if db.get_company(company_id)?.is_none() {
        bail!("Company not found: {}", company_id);
    }
    db.set_bookkeeper_connected(company_id, connected)?;

    if connected {
        println!("✓ {} will be included in scheduled runs", company_id);
    } else {
        println!("✓ {} will be skipped by scheduled runs", company_id);
    }
    Ok(())
}
