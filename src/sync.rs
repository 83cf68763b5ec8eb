//! Billing provider synchronization job.
//!
//! At most one run may be in flight per process: the job body is guarded by
//! an atomic running flag and an overlapping trigger becomes a no-op rather
//! than queuing. Any surrounding scheduler is an external concern; this
//! module only provides the job body and the flag.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use sqlx::SqlitePool;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::authz::Role;
use crate::errors::AppResult;
use crate::subscriptions::SubscriptionEngine;

#[derive(Default)]
pub struct SyncGuard {
    running: AtomicBool,
}

impl SyncGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the flag; false means another run is already in flight.
    fn try_begin(&self) -> bool {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn finish(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    AlreadyRunning,
    Completed { checked: usize, failed: usize },
}

/// Re-verify every subscription holding a billing reference. Individual
/// verification failures are logged and counted; they do not abort the run.
pub async fn run_billing_sync(
    pool: &SqlitePool,
    engine: &SubscriptionEngine,
    guard: &SyncGuard,
) -> AppResult<SyncOutcome> {
    if !guard.try_begin() {
        tracing::info!("billing sync trigger ignored; a run is already in flight");
        return Ok(SyncOutcome::AlreadyRunning);
    }

    let result = sync_all(pool, engine).await;
    guard.finish();

    match &result {
        Ok(SyncOutcome::Completed { checked, failed }) => {
            tracing::info!(checked, failed, "billing sync completed");
        }
        Ok(SyncOutcome::AlreadyRunning) => {}
        Err(err) => tracing::error!(error = %err, "billing sync aborted"),
    }

    result
}

async fn sync_all(pool: &SqlitePool, engine: &SubscriptionEngine) -> AppResult<SyncOutcome> {
    let targets: Vec<(Uuid, String)> = sqlx::query_as(
        "SELECT subject_id, role FROM subscriptions WHERE billing_subscription_ref IS NOT NULL",
    )
    .fetch_all(pool)
    .await?;

    let mut checked = 0usize;
    let mut failed = 0usize;

    for (subject_id, role) in targets {
        checked += 1;
        if let Err(err) = engine.sync_from_provider(subject_id, Role::parse(&role)).await {
            failed += 1;
            tracing::warn!(
                subject_id = %subject_id,
                role,
                error = %err,
                "subscription sync failed for subject"
            );
        }
    }

    Ok(SyncOutcome::Completed { checked, failed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::{BillingProvider, ProviderStatus};
    use async_trait::async_trait;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::Arc;

    struct AlwaysActive;

    #[async_trait]
    impl BillingProvider for AlwaysActive {
        async fn subscription_status(
            &self,
            _r: &str,
        ) -> Result<ProviderStatus, crate::billing::BillingError> {
            Ok(ProviderStatus::Active)
        }
    }

    #[tokio::test]
    async fn overlapping_trigger_is_a_noop() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!().run(&pool).await.unwrap();

        let engine = SubscriptionEngine::new(pool.clone(), Arc::new(AlwaysActive));
        let guard = SyncGuard::new();

        assert!(guard.try_begin());
        let outcome = run_billing_sync(&pool, &engine, &guard).await.unwrap();
        assert!(matches!(outcome, SyncOutcome::AlreadyRunning));

        guard.finish();
        let outcome = run_billing_sync(&pool, &engine, &guard).await.unwrap();
        assert!(matches!(outcome, SyncOutcome::Completed { checked: 0, .. }));
        assert!(!guard.is_running());
    }
}
