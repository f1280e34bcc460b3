//! Classification preview and confirmation commands

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clasibot_core::config::Config;
use clasibot_core::db::Database;
use clasibot_core::{
    AIClient, CategorizedResult, Category, ClassifiedHistoryEntry, DatabaseSource, LlmSource,
    MatchingSource, Resolver, TransactionDescriptor, WebEnricher,
};

/// Build the same resolver a run would use for this company
///
/// The LLM tier is only attached when a backend is configured via `AI_BACKEND`.
fn build_resolver(
    db: &Database,
    config: &Config,
    company_id: &str,
    ai: Option<AIClient>,
) -> Result<Resolver> {
    let classifier = &config.classifier;
    let matching = MatchingSource::load(
        db,
        company_id,
        classifier.history_years,
        classifier.match_threshold,
    )
    .context("Failed to load matching history")?;

    let mut resolver = Resolver::new(classifier.call_timeout())
        .with_matching(matching)
        .with_database(DatabaseSource::new(db.clone(), classifier.database_top_n));

    if let Some(ai) = ai {
        let industry = db.get_company(company_id)?.and_then(|c| c.industry);
        let mut llm = LlmSource::new(ai).with_company(industry.as_deref(), None);
        if let Some(enricher) = WebEnricher::from_config(&config.enrichment, classifier.call_timeout())
        {
            llm = llm.with_enricher(Arc::new(enricher));
        }
        resolver = resolver.with_llm(llm);
    }
    Ok(resolver)
}

/// Resolve one transaction name against `categories` without writing anything
pub async fn classify_preview(
    db: &Database,
    config: &Config,
    ai: Option<AIClient>,
    company_id: &str,
    name: &str,
    amount: f64,
    categories: &[String],
) -> Result<CategorizedResult> {
    let valid: Vec<Category> = categories
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(|c| Category::new(c, c))
        .collect();
    if valid.is_empty() {
        anyhow::bail!("At least one category is required");
    }

    let resolver = build_resolver(db, config, company_id, ai)?;
    tracing::debug!(company_id = %company_id, categories = valid.len(), "Resolving preview");
    let transaction = TransactionDescriptor::new("preview", name, amount);
    Ok(resolver.resolve(&transaction, &valid).await)
}

pub async fn cmd_classify(
    db: &Database,
    config: &Config,
    company_id: &str,
    name: &str,
    amount: f64,
    categories: &[String],
) -> Result<()> {
    let ai = AIClient::from_env();
    if ai.is_none() {
        println!("   💡 Tip: Set AI_BACKEND / OLLAMA_HOST to enable the LLM tier");
    }

    let result = classify_preview(db, config, ai, company_id, name, amount, categories).await?;

    println!("🔎 {}", name);
    if result.possible_categories.is_empty() {
        println!("   No category found (left for manual review)");
        return Ok(());
    }
    for (i, classified) in result.classified_categories().iter().enumerate() {
        println!(
            "   {}. {} [{}]",
            i + 1,
            classified.category.name,
            classified.classified_by
        );
    }
    Ok(())
}

pub fn cmd_confirm(
    db: &Database,
    name: &str,
    category: &str,
    company_id: Option<&str>,
    amount: f64,
    date: Option<&str>,
) -> Result<()> {
    let date = match date {
        Some(d) => NaiveDate::parse_from_str(d, "%Y-%m-%d")
            .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", d))?,
        None => Utc::now().date_naive(),
    };

    let count = db
        .record_confirmed_classification(name, category)
        .context("Failed to record confirmation")?;
    println!("✓ {} → {} (confirmed {} times)", name, category, count);

    if let Some(company_id) = company_id {
        db.add_classified_history(&ClassifiedHistoryEntry {
            company_id: company_id.to_string(),
            name: name.to_string(),
            amount,
            category: category.to_string(),
            date,
        })
        .context("Failed to add matching history")?;
        println!("  Added to matching history for {}", company_id);
    }
    Ok(())
}
