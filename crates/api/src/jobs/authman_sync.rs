//! Periodic reconciliation of managed groups against the directory.

use domain::services::AuthmanReconciler;
use tracing::{info, warn};

use super::scheduler::{Job, JobFrequency};

pub struct AuthmanSyncJob {
    reconciler: AuthmanReconciler,
    interval_minutes: u64,
}

impl AuthmanSyncJob {
    pub fn new(reconciler: AuthmanReconciler, interval_minutes: u64) -> Self {
        Self {
            reconciler,
            interval_minutes,
        }
    }
}

#[async_trait::async_trait]
impl Job for AuthmanSyncJob {
    fn name(&self) -> &'static str {
        "authman_sync"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Minutes(self.interval_minutes)
    }

    fn run_on_start(&self) -> bool {
        true
    }

    async fn execute(&self) -> Result<(), String> {
        let summary = self
            .reconciler
            .reconcile_all(None, false)
            .await
            .map_err(|e| e.to_string())?;

        let failed: Vec<_> = summary
            .outcomes
            .iter()
            .filter(|o| o.error.is_some())
            .collect();
        for outcome in &failed {
            warn!(
                group_id = %outcome.group_id,
                error = outcome.error.as_deref().unwrap_or_default(),
                "Group synchronization failed"
            );
        }

        info!(
            considered = summary.groups_considered,
            skipped = summary.groups_skipped,
            synced = summary.outcomes.len() - failed.len(),
            failed = failed.len(),
            "Directory synchronization pass finished"
        );
        Ok(())
    }
}
