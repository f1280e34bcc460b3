//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Core commands (init) and shared utilities (open_db, load_config)
//! - `classify` - One-off classification preview and the confirmation path
//! - `companies` - Company registry commands (list, add, connect, disconnect)
//! - `review` - Next scheduled review
//! - `run` - Classification runs and the job log
//! - `serve` - Web server command

pub mod classify;
pub mod companies;
pub mod core;
pub mod review;
pub mod run;
pub mod serve;

// Re-export command functions for main.rs
pub use classify::*;
pub use companies::*;
pub use core::*;
pub use review::*;
pub use run::*;
pub use serve::*;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
