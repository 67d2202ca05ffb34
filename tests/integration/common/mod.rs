#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reward_service_lib::commands::AppState;
use reward_service_lib::config::EngineConfig;
use reward_service_lib::db::DbPool;
use reward_service_lib::error::{AppError, AppResult, Collaborator};
use reward_service_lib::models::content::{
    ContentMetadata, ContentProvider, ContentSnapshot, CourseProvider, ProgressLogItem,
    UserProgressData,
};
use reward_service_lib::models::event::ContentProgressedEvent;
use tempfile::TempDir;
use uuid::Uuid;

/// Serves the same course snapshot to every user.
#[derive(Default)]
pub struct FakeContentService {
    contents: Mutex<Vec<ContentSnapshot>>,
    failure: Mutex<Option<bool>>,
    delay: Mutex<Option<StdDuration>>,
    calls: AtomicUsize,
}

impl FakeContentService {
    pub fn set_contents(&self, contents: Vec<ContentSnapshot>) {
        *self.contents.lock().unwrap() = contents;
    }

    /// Makes every following call fail; `Some(retryable)` or `None` to recover.
    pub fn fail_with(&self, retryable: Option<bool>) {
        *self.failure.lock().unwrap() = retryable;
    }

    pub fn delay_by(&self, delay: Option<StdDuration>) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentProvider for FakeContentService {
    async fn contents_with_progress(
        &self,
        _user_id: Uuid,
        _chapter_ids: &[Uuid],
    ) -> AppResult<Vec<ContentSnapshot>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failure = *self.failure.lock().unwrap();
        if let Some(retryable) = failure {
            return Err(AppError::collaborator_unavailable(
                Collaborator::ContentService,
                "content service offline",
                retryable,
            ));
        }
        Ok(self.contents.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct FakeCourseService {
    courses: Mutex<HashSet<Uuid>>,
    content_courses: Mutex<HashMap<Uuid, Uuid>>,
}

impl FakeCourseService {
    pub fn add_course(&self, course_id: Uuid) {
        self.courses.lock().unwrap().insert(course_id);
    }

    pub fn remove_course(&self, course_id: Uuid) {
        self.courses.lock().unwrap().remove(&course_id);
    }

    pub fn assign(&self, content_id: Uuid, course_id: Uuid) {
        self.content_courses
            .lock()
            .unwrap()
            .insert(content_id, course_id);
    }
}

#[async_trait]
impl CourseProvider for FakeCourseService {
    async fn chapter_ids(&self, course_id: Uuid) -> AppResult<Vec<Uuid>> {
        if self.courses.lock().unwrap().contains(&course_id) {
            Ok(vec![course_id])
        } else {
            Err(AppError::invalid_scope(format!("unknown course {course_id}")))
        }
    }

    async fn course_id_for_content(&self, content_id: Uuid) -> AppResult<Uuid> {
        self.content_courses
            .lock()
            .unwrap()
            .get(&content_id)
            .copied()
            .ok_or_else(|| AppError::invalid_scope(format!("orphan content {content_id}")))
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub state: AppState,
    pub contents: Arc<FakeContentService>,
    pub courses: Arc<FakeCourseService>,
    pub course_id: Uuid,
    pub user_id: Uuid,
}

pub fn harness() -> Harness {
    harness_with(EngineConfig::default())
}

pub fn harness_with(config: EngineConfig) -> Harness {
    let dir = tempfile::tempdir().expect("temp dir");
    let pool = DbPool::new(dir.path().join("reward.sqlite")).expect("db pool");
    let contents = Arc::new(FakeContentService::default());
    let courses = Arc::new(FakeCourseService::default());
    let course_id = Uuid::new_v4();
    courses.add_course(course_id);

    let state = AppState::with_providers(
        pool,
        Arc::clone(&contents) as Arc<dyn ContentProvider>,
        Arc::clone(&courses) as Arc<dyn CourseProvider>,
        &config,
    );

    Harness {
        dir,
        state,
        contents,
        courses,
        course_id,
        user_id: Uuid::new_v4(),
    }
}

/// New content due `days_overdue` days ago that the user never touched.
pub fn overdue_content(days_overdue: i64, reward_points: i32) -> ContentSnapshot {
    ContentSnapshot {
        id: Uuid::new_v4(),
        metadata: ContentMetadata {
            suggested_date: Some(Utc::now() - Duration::days(days_overdue) - Duration::minutes(5)),
            reward_points,
            ..Default::default()
        },
        user_progress_data: UserProgressData::default(),
    }
}

/// Content the user completed successfully at `at`.
pub fn completed_content(id: Uuid, at: DateTime<Utc>, reward_points: i32) -> ContentSnapshot {
    ContentSnapshot {
        id,
        metadata: ContentMetadata {
            suggested_date: Some(at),
            reward_points,
            ..Default::default()
        },
        user_progress_data: UserProgressData {
            is_learned: true,
            learning_interval: Some(2),
            last_learn_date: Some(at),
            next_learn_date: Some(at + Duration::days(2)),
            log: vec![ProgressLogItem {
                timestamp: at,
                success: true,
                correctness: 1.0,
                hints_used: 0,
                time_to_complete: None,
            }],
        },
    }
}

pub fn progress_event(user_id: Uuid, content_id: Uuid, at: DateTime<Utc>) -> ContentProgressedEvent {
    ContentProgressedEvent {
        user_id,
        content_id,
        correctness: 1.0,
        success: true,
        hints_used: 0,
        timestamp: Some(at),
        time_to_complete: Some(30),
    }
}

pub fn cloud_event_body(event: &ContentProgressedEvent) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "id": Uuid::new_v4().to_string(),
        "source": "content-service",
        "type": "com.dapr.event.sent",
        "topic": "content-progressed",
        "data": event,
    }))
    .expect("serializable event")
}
