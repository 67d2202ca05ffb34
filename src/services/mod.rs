pub mod calculation;
pub mod content_service_client;
pub mod course_service_client;
pub mod graphql_client;
pub mod reward_service;

use crate::error::{AppError, AppResult};

/// Runs blocking SQLite work off the async workers.
pub(crate) async fn run_blocking<T: Send + 'static>(
    task: impl FnOnce() -> AppResult<T> + Send + 'static,
) -> AppResult<T> {
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|err| AppError::other(format!("后台任务执行失败: {err}")))?
}
