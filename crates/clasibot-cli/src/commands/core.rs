//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `load_config` - Config file plus environment overrides
//! - `cmd_init` - Initialize the database

use std::path::Path;

use anyhow::{Context, Result};
use clasibot_core::config::Config;
use clasibot_core::db::Database;

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .context("Database path must be valid UTF-8")?;
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

/// Load configuration from `--config`, the default location, and the environment
pub fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let config = Config::load(config_path).context("Failed to load configuration")?;
    tracing::debug!(?config, "Configuration loaded");
    Ok(config)
}

pub fn cmd_init(db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    let db = open_db(db_path, no_encrypt)?;
    let companies = db.list_companies().context("Failed to read company registry")?;
    println!("   Companies registered: {}", companies.len());

    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else {
        println!("   🔒 Encryption: ENABLED");
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Register a company: clasibot companies add <ID> --name <NAME>");
    println!("  2. Mark it connected:  clasibot companies connect <ID>");
    println!("  3. Start the server:   clasibot serve");

    Ok(())
}
