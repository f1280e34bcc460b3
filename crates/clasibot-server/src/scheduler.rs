//! In-process scheduler for classification runs
//!
//! Runs can be started without an external cron service by setting:
//!
//! - `CLASIBOT_SCHEDULE_HOURS`: interval in hours (e.g., "168" for weekly)
//!
//! The first run happens one interval after startup.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::{info, warn};

use clasibot_core::orchestrator::Orchestrator;
use clasibot_core::JobStatus;

/// Configuration for scheduled runs
#[derive(Debug, Clone)]
pub struct ClassifyScheduleConfig {
    /// Interval between runs in hours
    pub interval_hours: u64,
}

impl ClassifyScheduleConfig {
    /// Parse configuration from environment variables
    ///
    /// Returns None if scheduling is not configured (CLASIBOT_SCHEDULE_HOURS not set)
    pub fn from_env() -> Option<Self> {
        let interval_hours: u64 = std::env::var("CLASIBOT_SCHEDULE_HOURS")
            .ok()
            .and_then(|s| s.trim().parse().ok())?;

        if interval_hours == 0 {
            warn!("CLASIBOT_SCHEDULE_HOURS is 0, scheduled runs disabled");
            return None;
        }

        Some(Self { interval_hours })
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(self.interval_hours * 3600)
    }
}

/// Start the run scheduler as a background task
pub fn start_classify_scheduler(orchestrator: Arc<Orchestrator>, config: ClassifyScheduleConfig) {
    info!(
        "Starting classification scheduler: every {} hours",
        config.interval_hours
    );

    tokio::spawn(async move {
        let mut ticker = interval(config.period());

        // Skip the first immediate tick - runs start one interval after boot
        ticker.tick().await;

        loop {
            ticker.tick().await;

            info!("Running scheduled classification...");
            let summary = orchestrator.run().await;
            let failed = summary.count(JobStatus::Failed);
            if failed > 0 {
                warn!(
                    "Scheduled run {} finished with {} failed companies",
                    summary.run_id, failed
                );
            } else {
                info!(
                    "Scheduled run {} completed ({} companies)",
                    summary.run_id,
                    summary.outcomes.len()
                );
            }
        }
    });
}
