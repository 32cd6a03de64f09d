//! Session Cleanup Scheduler
//!
//! Periodically moves STARTED attempts whose time limit plus a grace period
//! has passed to ABANDONED. Touches durable storage only.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{CleanupConfig, DEFAULT_CLEANUP_INTERVAL_SECS};
use crate::error::StorageResult;
use crate::storage::AttemptRepository;

// == Sweep Outcome ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepOutcome {
    pub candidates: u64,
    pub abandoned: u64,
}

// == Session Cleanup Scheduler ==
pub struct SessionCleanupScheduler {
    attempts: Arc<dyn AttemptRepository>,
    interval: Duration,
    grace_period: Duration,
}

impl SessionCleanupScheduler {
    /// A zero `interval` is replaced by the default; the ticker cannot run at zero.
    pub fn new(attempts: Arc<dyn AttemptRepository>, interval: Duration, grace_period: Duration) -> Self {
        let interval = if interval.is_zero() {
            warn!(
                default_secs = DEFAULT_CLEANUP_INTERVAL_SECS,
                "Zero cleanup interval, using default"
            );
            Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS)
        } else {
            interval
        };

        Self {
            attempts,
            interval,
            grace_period,
        }
    }

    pub fn from_config(attempts: Arc<dyn AttemptRepository>, config: &CleanupConfig) -> Self {
        Self::new(attempts, config.interval, config.grace_period)
    }

    // == Sweep Once ==
    /// Counts the expired attempts, then marks them in one bulk update.
    ///
    /// A submission landing between the two steps makes the counts differ;
    /// that is logged, not treated as an error.
    pub async fn sweep_once(&self) -> StorageResult<SweepOutcome> {
        let now = Utc::now();
        let candidates = self.attempts.count_expired(now, self.grace_period).await?;

        if candidates == 0 {
            debug!("Session cleanup found no expired attempts");
            return Ok(SweepOutcome::default());
        }

        info!(candidates, "Marking expired exam attempts as abandoned");
        let abandoned = self
            .attempts
            .mark_expired_abandoned(now, self.grace_period)
            .await?;

        if abandoned != candidates {
            warn!(
                candidates,
                updated = abandoned,
                "Abandoned attempt count differs from candidate count"
            );
        }

        Ok(SweepOutcome {
            candidates,
            abandoned,
        })
    }

    // == Run ==
    /// Sweeps immediately, then on every tick until `shutdown` is cancelled.
    /// A failed sweep is logged and retried on the next tick.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            grace_secs = self.grace_period.as_secs(),
            "Starting session cleanup scheduler"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Session cleanup scheduler stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            if let Err(e) = self.sweep_once().await {
                error!(error = %e, "Session cleanup sweep failed");
            }
        }
    }
}

/// Spawns [`SessionCleanupScheduler::run`] on the runtime.
pub fn spawn_session_cleanup(
    scheduler: SessionCleanupScheduler,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(scheduler.run(shutdown))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::exam::models::{
        AttemptCompletion, AttemptId, AttemptStatus, ExamAttempt, ExamId, NewAttempt, PackageId,
        UserId,
    };
    use crate::storage::InMemoryExamStore;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration as ChronoDuration};
    use std::sync::atomic::{AtomicU64, Ordering};

    const GRACE: Duration = Duration::from_secs(120);

    async fn started_minutes_ago(store: &InMemoryExamStore, user_id: UserId, minutes: i64) -> AttemptId {
        store
            .create_attempt(NewAttempt {
                user_id,
                exam_id: 1,
                package_id: 1,
                session_token: format!("token-{}", user_id),
                started_at: Utc::now() - ChronoDuration::minutes(minutes),
                time_limit_seconds: 3600,
                total_questions: 2,
                passing_score: 3.0,
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_sweep_abandons_only_attempts_past_grace() {
        let store = Arc::new(InMemoryExamStore::new());
        store.seed_demo().await;
        let old = started_minutes_ago(&store, 1, 63).await;
        let recent = started_minutes_ago(&store, 2, 61).await;

        let scheduler = SessionCleanupScheduler::new(store.clone(), Duration::from_secs(60), GRACE);
        let outcome = scheduler.sweep_once().await.unwrap();

        assert_eq!(outcome, SweepOutcome { candidates: 1, abandoned: 1 });
        assert_eq!(store.attempt(old).await.unwrap().status, AttemptStatus::Abandoned);
        assert_eq!(store.attempt(recent).await.unwrap().status, AttemptStatus::Started);
    }

    #[tokio::test]
    async fn test_sweep_with_nothing_to_do() {
        let store = Arc::new(InMemoryExamStore::new());
        let scheduler = SessionCleanupScheduler::new(store, Duration::from_secs(60), GRACE);

        assert_eq!(scheduler.sweep_once().await.unwrap(), SweepOutcome::default());
    }

    #[tokio::test]
    async fn test_run_sweeps_immediately_and_stops_on_cancel() {
        let store = Arc::new(InMemoryExamStore::new());
        store.seed_demo().await;
        let old = started_minutes_ago(&store, 1, 90).await;

        let shutdown = CancellationToken::new();
        let scheduler = SessionCleanupScheduler::new(store.clone(), Duration::from_secs(3600), GRACE);
        let handle = spawn_session_cleanup(scheduler, shutdown.clone());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.attempt(old).await.unwrap().status, AttemptStatus::Abandoned);

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("scheduler should stop promptly")
            .unwrap();
    }

    /// Fails the first count, then reports one candidate that a concurrent
    /// submission has already finished.
    struct FlakyRepository {
        counts: AtomicU64,
    }

    #[async_trait]
    impl AttemptRepository for FlakyRepository {
        async fn find_attempt_for_exam(
            &self,
            _: UserId,
            _: ExamId,
            _: PackageId,
        ) -> StorageResult<Option<ExamAttempt>> {
            Ok(None)
        }

        async fn create_attempt(&self, _: NewAttempt) -> StorageResult<ExamAttempt> {
            Err(StorageError::Backend("read only".to_string()))
        }

        async fn find_active_by_session(&self, _: &str) -> StorageResult<Option<ExamAttempt>> {
            Ok(None)
        }

        async fn find_finished_by_session(&self, _: &str) -> StorageResult<Option<ExamAttempt>> {
            Ok(None)
        }

        async fn find_by_session_and_user(
            &self,
            _: &str,
            _: UserId,
        ) -> StorageResult<Option<ExamAttempt>> {
            Ok(None)
        }

        async fn complete_attempt(&self, _: AttemptId, _: AttemptCompletion) -> StorageResult<bool> {
            Ok(false)
        }

        async fn count_expired(&self, _: DateTime<Utc>, _: Duration) -> StorageResult<u64> {
            if self.counts.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(StorageError::Backend("connection reset".to_string()));
            }
            Ok(1)
        }

        async fn mark_expired_abandoned(&self, _: DateTime<Utc>, _: Duration) -> StorageResult<u64> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_failed_sweep_is_retried_and_race_tolerated() {
        let repo = Arc::new(FlakyRepository {
            counts: AtomicU64::new(0),
        });
        let scheduler = SessionCleanupScheduler::new(repo.clone(), Duration::from_secs(60), GRACE);

        assert!(scheduler.sweep_once().await.is_err());

        let outcome = scheduler.sweep_once().await.unwrap();
        assert_eq!(outcome, SweepOutcome { candidates: 1, abandoned: 0 });
    }

    #[tokio::test]
    async fn test_run_survives_failed_sweep() {
        let repo = Arc::new(FlakyRepository {
            counts: AtomicU64::new(0),
        });
        let shutdown = CancellationToken::new();
        let scheduler = SessionCleanupScheduler::new(repo.clone(), Duration::from_millis(20), GRACE);
        let handle = spawn_session_cleanup(scheduler, shutdown.clone());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(repo.counts.load(Ordering::SeqCst) >= 2);
        assert!(!handle.is_finished());

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_interval_falls_back_and_keeps_running() {
        let store = Arc::new(InMemoryExamStore::new());
        store.seed_demo().await;
        let old = started_minutes_ago(&store, 1, 90).await;

        let scheduler = SessionCleanupScheduler::new(store.clone(), Duration::ZERO, GRACE);
        assert_eq!(scheduler.interval, Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS));

        let shutdown = CancellationToken::new();
        let handle = spawn_session_cleanup(scheduler, shutdown.clone());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!handle.is_finished());
        assert_eq!(store.attempt(old).await.unwrap().status, AttemptStatus::Abandoned);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
