use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::db::repositories::processed_event_repository::{
    ProcessedEventKey, ProcessedEventRepository,
};
use crate::db::repositories::reward_score_repository::RewardScoreRepository;
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::content::{ContentProvider, ContentSnapshot, CourseProvider};
use crate::models::event::ContentProgressedEvent;
use crate::models::reward::{AllRewardScores, Dimension, ScoreKey};
use crate::services::calculation::{default_calculators, HealthScoreCalculator, ScoreCalculator};
use crate::services::run_blocking;

/// Processed-event markers older than this are purged by the nightly job.
const PROCESSED_EVENT_RETENTION_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy)]
enum ScoreTrigger<'e> {
    Batch,
    Activity(&'e ContentProgressedEvent),
}

/// Result of handling one activity event.
#[derive(Debug, Clone, PartialEq)]
pub enum ActivityOutcome {
    Applied(AllRewardScores),
    /// The event was already reflected in the scores; nothing was written.
    Duplicate,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub retryable_failures: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Orchestrates both trigger paths over one `(user, course)` aggregate at a time.
pub struct RewardService {
    db: DbPool,
    content_provider: Arc<dyn ContentProvider>,
    course_provider: Arc<dyn CourseProvider>,
    health: HealthScoreCalculator,
    calculators: Vec<Box<dyn ScoreCalculator>>,
    locks: DashMap<ScoreKey, Arc<Mutex<()>>>,
    batch_concurrency: usize,
    nightly_run_hour: u32,
    job_started: AtomicBool,
}

impl RewardService {
    pub fn new(
        db: DbPool,
        content_provider: Arc<dyn ContentProvider>,
        course_provider: Arc<dyn CourseProvider>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            db,
            content_provider,
            course_provider,
            health: HealthScoreCalculator::new(),
            calculators: default_calculators(&config.scoring),
            locks: DashMap::new(),
            batch_concurrency: config.batch_concurrency.max(1),
            nightly_run_hour: config.nightly_run_hour,
            job_started: AtomicBool::new(false),
        }
    }

    /// Stored scores without computing anything.
    pub async fn get_scores(&self, course_id: Uuid, user_id: Uuid) -> AppResult<AllRewardScores> {
        let key = ScoreKey::new(user_id, course_id);
        let db = self.db.clone();
        run_blocking(move || db.with_connection(|conn| RewardScoreRepository::find(conn, key)))
            .await?
            .ok_or_else(AppError::not_found)
    }

    /// Batch-style recomputation of one aggregate outside the schedule.
    pub async fn recalculate_scores(
        &self,
        course_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<AllRewardScores> {
        let key = ScoreKey::new(user_id, course_id);
        self.compute(key, ScoreTrigger::Batch)
            .await?
            .ok_or_else(|| AppError::other(format!("batch recomputation of {key} was skipped")))
    }

    /// Incremental path for one finished content. Resolves the owning course first.
    pub async fn calculate_scores_on_content_worked_on(
        &self,
        event: &ContentProgressedEvent,
    ) -> AppResult<ActivityOutcome> {
        let course_id = self
            .course_provider
            .course_id_for_content(event.content_id)
            .await?;
        let key = ScoreKey::new(event.user_id, course_id);

        match self.compute(key, ScoreTrigger::Activity(event)).await? {
            Some(scores) => Ok(ActivityOutcome::Applied(scores)),
            None => Ok(ActivityOutcome::Duplicate),
        }
    }

    /// Recomputes every stored aggregate with at most `batch_concurrency` in flight.
    /// Failures are counted and logged; they never abort the remaining keys.
    pub async fn recalculate_all(self: &Arc<Self>) -> AppResult<BatchSummary> {
        let started_at = Utc::now();
        let db = self.db.clone();
        let keys = run_blocking(move || db.with_connection(RewardScoreRepository::list_keys)).await?;

        info!(
            target: "app::reward",
            aggregates = keys.len(),
            concurrency = self.batch_concurrency,
            "batch recalculation started"
        );

        let semaphore = Arc::new(Semaphore::new(self.batch_concurrency));
        let mut tasks = Vec::with_capacity(keys.len());
        for key in &keys {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|err| AppError::other(format!("batch worker pool closed: {err}")))?;
            let service = Arc::clone(self);
            let key = *key;
            tasks.push(tokio::spawn(async move {
                let _permit = permit;
                (key, service.compute(key, ScoreTrigger::Batch).await)
            }));
        }

        let mut summary = BatchSummary {
            total: keys.len(),
            succeeded: 0,
            failed: 0,
            retryable_failures: 0,
            started_at,
            finished_at: started_at,
        };

        for task in tasks {
            match task.await {
                Ok((_, Ok(_))) => summary.succeeded += 1,
                Ok((key, Err(err))) => {
                    summary.failed += 1;
                    if err.is_retryable() {
                        summary.retryable_failures += 1;
                    }
                    warn!(target: "app::reward", key = %key, error = %err, "batch recalculation failed");
                }
                Err(err) => {
                    summary.failed += 1;
                    error!(target: "app::reward", error = %err, "failed to join batch task");
                }
            }
        }

        summary.finished_at = Utc::now();
        info!(
            target: "app::reward",
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "batch recalculation finished"
        );
        Ok(summary)
    }

    /// Starts the daily batch loop once per service instance. Must be called
    /// from within a tokio runtime.
    pub fn ensure_nightly_job(self: &Arc<Self>) -> AppResult<()> {
        if self
            .job_started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let service = Arc::clone(self);
            tokio::spawn(async move {
                service.run_nightly_job().await;
            });
            info!(
                target: "app::reward",
                run_hour = self.nightly_run_hour,
                "nightly reward job started"
            );
        }
        Ok(())
    }

    async fn run_nightly_job(self: Arc<Self>) {
        loop {
            let now = Utc::now();
            let next_run = next_run_after(now, self.nightly_run_hour);
            let wait = (next_run - now)
                .to_std()
                .unwrap_or(std::time::Duration::from_secs(3600));

            debug!(
                target: "app::reward",
                wait_secs = wait.as_secs(),
                "waiting for next nightly recalculation"
            );
            tokio::time::sleep(wait).await;

            if let Err(err) = self.recalculate_all().await {
                error!(target: "app::reward", error = %err, "nightly recalculation failed");
            }
            if let Err(err) = self.purge_processed_events(Utc::now()).await {
                error!(target: "app::reward", error = %err, "failed to purge processed events");
            }
        }
    }

    /// Drops duplicate-detection markers past the retention window.
    pub async fn purge_processed_events(&self, now: DateTime<Utc>) -> AppResult<usize> {
        let cutoff = now - Duration::days(PROCESSED_EVENT_RETENTION_DAYS);
        let db = self.db.clone();
        let purged = run_blocking(move || {
            db.with_connection(|conn| ProcessedEventRepository::purge_before(conn, cutoff))
        })
        .await?;
        if purged > 0 {
            info!(target: "app::reward", purged, "purged processed activity events");
        }
        Ok(purged)
    }

    async fn compute(
        &self,
        key: ScoreKey,
        trigger: ScoreTrigger<'_>,
    ) -> AppResult<Option<AllRewardScores>> {
        let guard = self.lock_for(key).lock_owned().await;
        let result = self.compute_locked(key, trigger, guard).await;
        self.locks.remove_if(&key, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    /// `guard` moves into the blocking write, so the key stays locked until the
    /// transaction finishes even when the caller stops waiting for it.
    async fn compute_locked(
        &self,
        key: ScoreKey,
        trigger: ScoreTrigger<'_>,
        guard: OwnedMutexGuard<()>,
    ) -> AppResult<Option<AllRewardScores>> {
        let processed = match trigger {
            ScoreTrigger::Activity(event) => event.timestamp.map(|occurred_at| ProcessedEventKey {
                user_id: event.user_id,
                content_id: event.content_id,
                occurred_at,
            }),
            ScoreTrigger::Batch => None,
        };

        if let Some(processed) = processed {
            let db = self.db.clone();
            let seen = run_blocking(move || {
                db.with_connection(|conn| ProcessedEventRepository::is_processed(conn, &processed))
            })
            .await?;
            if seen {
                info!(target: "app::reward", key = %key, "activity event already processed");
                return Ok(None);
            }
        }

        let contents = self.fetch_contents(key).await?;
        let now = Utc::now();

        let db = self.db.clone();
        let stored = run_blocking(move || {
            db.with_connection(|conn| RewardScoreRepository::find(conn, key))
        })
        .await?;
        let fresh = stored.is_none();
        let mut scores = match stored {
            Some(scores) => scores,
            None => {
                let health = self.health.initial_value(&contents, now);
                debug!(target: "app::reward", key = %key, health, "seeding new aggregate");
                AllRewardScores::initial(key, health)
            }
        };

        for calculator in &self.calculators {
            match trigger {
                ScoreTrigger::Batch => {
                    // The seed already accounts for overdue content.
                    if fresh && calculator.dimension() == Dimension::Health {
                        continue;
                    }
                    calculator.recalculate(&mut scores, &contents, now);
                }
                ScoreTrigger::Activity(event) => {
                    calculator.calculate_on_activity(&mut scores, &contents, event, now);
                }
            }
        }

        let db = self.db.clone();
        let course_id = key.course_id;
        let (scores, written) = run_blocking(move || {
            let _guard = guard;
            let written = db.with_transaction(|tx| {
                if let Some(processed) = &processed {
                    if !ProcessedEventRepository::mark_processed(tx, processed, course_id)? {
                        return Ok(false);
                    }
                }
                RewardScoreRepository::save(tx, &scores)?;
                Ok(true)
            })?;
            Ok((scores, written))
        })
        .await?;

        if !written {
            info!(target: "app::reward", key = %key, "activity event processed concurrently");
            return Ok(None);
        }

        debug!(
            target: "app::reward",
            key = %key,
            health = scores.health.value,
            fitness = scores.fitness.value,
            growth = scores.growth.value,
            power = scores.power.value,
            "reward scores updated"
        );
        Ok(Some(scores))
    }

    async fn fetch_contents(&self, key: ScoreKey) -> AppResult<Vec<ContentSnapshot>> {
        let chapter_ids = self.course_provider.chapter_ids(key.course_id).await?;
        self.content_provider
            .contents_with_progress(key.user_id, &chapter_ids)
            .await
    }

    fn lock_for(&self, key: ScoreKey) -> Arc<Mutex<()>> {
        self.locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Next occurrence of `hour:00` UTC strictly after `now`.
pub fn next_run_after(now: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    let today = now
        .date_naive()
        .and_hms_opt(hour.min(23), 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive));

    match today {
        Some(candidate) if candidate > now => candidate,
        Some(candidate) => candidate + Duration::days(1),
        None => now + Duration::days(1),
    }
}
