//! Next review command

use anyhow::{bail, Result};
use chrono::{Duration, Utc};
use clasibot_core::db::Database;

/// Show the next review, or move it to `set_days` from now
///
/// Without a stored value the default interval is stored and shown, matching
/// the `/api/next-review` endpoint.
pub fn cmd_next_review(db: &Database, interval_days: i64, set_days: Option<i64>) -> Result<()> {
    let next_review = match set_days {
        Some(days) if days < 0 => bail!("--set-days must not be negative"),
        Some(days) => {
            let at = Utc::now() + Duration::days(days);
            db.set_next_review(at)?;
            println!("✓ Next review moved");
            at
        }
        None => db.get_or_init_next_review(interval_days)?,
    };

    println!(
        "📅 Next review: {}",
        next_review.format("%Y-%m-%d %H:%M UTC")
    );
    let remaining = next_review - Utc::now();
    if remaining.num_seconds() <= 0 {
        println!("   Due now");
    } else {
        println!(
            "   In {} days, {} hours",
            remaining.num_days(),
            remaining.num_hours() % 24
        );
    }
    Ok(())
}
