//! HTTP request handlers organized by domain
//!
//! Each submodule contains handlers for a specific API area.

pub mod classify;
pub mod review;
pub mod runs;

// Re-export all handlers for use in router
pub use classify::*;
pub use review::*;
pub use runs::*;

/// GET /health
pub async fn health() -> &'static str {
    "ok"
}
