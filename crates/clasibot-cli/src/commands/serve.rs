//! Server command implementation

use std::path::Path;

use anyhow::Result;
use clasibot_core::config::Config;

use super::open_db;

pub async fn cmd_serve(
    db_path: &Path,
    host: &str,
    port: u16,
    no_encrypt: bool,
    config: Config,
) -> Result<()> {
    println!("🚀 Starting Clasibot server...");
    println!("   Database: {}", db_path.display());
    println!("   Listening: http://{}:{}", host, port);

    if config.cron_secret.as_deref().map_or(true, str::is_empty) {
        println!();
        println!("   ⚠️  CRON_SECRET is not set - the trigger will answer 500");
    } else {
        println!("   🔑 Trigger: Bearer CRON_SECRET");
    }
    match (
        config.endpoints.ledger_base_url.as_deref(),
        config.endpoints.session_service_url.as_deref(),
    ) {
        (Some(ledger), Some(_)) => println!("   📒 Ledger: {}", ledger),
        _ => {
            println!("   ⚠️  LEDGER_BASE_URL / SESSION_SERVICE_URL not set - runs disabled")
        }
    }
    if let Ok(hours) = std::env::var("CLASIBOT_SCHEDULE_HOURS") {
        println!("   ⏰ Scheduled runs: every {} hours", hours.trim());
    }
    if no_encrypt {
        println!("   ⚠️  Encryption DISABLED (--no-encrypt)");
    }
    println!();
    println!("   Press Ctrl+C to stop");

    let db = open_db(db_path, no_encrypt)?;
    clasibot_server::serve(db, host, port, config).await?;

    Ok(())
}
