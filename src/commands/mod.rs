pub mod reward;
pub mod subscription;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use tracing::{error, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::content::{ContentProvider, CourseProvider};
use crate::services::content_service_client::ContentServiceClient;
use crate::services::course_service_client::CourseServiceClient;
use crate::services::reward_service::RewardService;

#[derive(Clone)]
pub struct AppState {
    db_pool: DbPool,
    reward_service: Arc<RewardService>,
    activity_timeout: StdDuration,
}

impl AppState {
    /// Wires the HTTP collaborators from `config`.
    pub fn new(db_pool: DbPool, config: &EngineConfig) -> AppResult<Self> {
        let content_provider: Arc<dyn ContentProvider> = Arc::new(ContentServiceClient::new(
            &config.content_service_url,
            config.http_timeout,
        )?);
        let course_provider: Arc<dyn CourseProvider> = Arc::new(CourseServiceClient::new(
            &config.course_service_url,
            config.http_timeout,
        )?);

        Ok(Self::with_providers(
            db_pool,
            content_provider,
            course_provider,
            config,
        ))
    }

    pub fn with_providers(
        db_pool: DbPool,
        content_provider: Arc<dyn ContentProvider>,
        course_provider: Arc<dyn CourseProvider>,
        config: &EngineConfig,
    ) -> Self {
        let reward_service = Arc::new(RewardService::new(
            db_pool.clone(),
            content_provider,
            course_provider,
            config,
        ));

        Self {
            db_pool,
            reward_service,
            activity_timeout: config.activity_timeout,
        }
    }

    pub fn rewards(&self) -> Arc<RewardService> {
        Arc::clone(&self.reward_service)
    }

    pub fn db(&self) -> DbPool {
        self.db_pool.clone()
    }

    pub fn activity_timeout(&self) -> StdDuration {
        self.activity_timeout
    }
}

pub type CommandResult<T> = Result<T, CommandError>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<JsonValue>,
}

impl CommandError {
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        details: Option<JsonValue>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details,
        }
    }
}

impl From<AppError> for CommandError {
    fn from(error: AppError) -> Self {
        match error {
            AppError::Validation {
                message, details, ..
            } => CommandError::new("VALIDATION_ERROR", message, details),
            AppError::NotFound => CommandError::new("NOT_FOUND", "请求的奖励分数不存在", None),
            AppError::Conflict { message } => CommandError::new("CONFLICT", message, None),
            AppError::InvalidScope { message } => {
                warn!(target: "app::command", %message, "invalid scope in command");
                CommandError::new("INVALID_SCOPE", message, None)
            }
            AppError::CollaboratorUnavailable {
                collaborator,
                message,
                retryable,
            } => {
                warn!(target: "app::command", %collaborator, %message, retryable, "collaborator unavailable in command");
                CommandError::new(
                    "COLLABORATOR_UNAVAILABLE",
                    message,
                    Some(json!({ "collaborator": collaborator.as_str(), "retryable": retryable })),
                )
            }
            AppError::Timeout {
                operation,
                after_ms,
            } => CommandError::new(
                "TIMEOUT",
                format!("操作超时: {operation}"),
                Some(json!({ "afterMs": after_ms, "retryable": true })),
            ),
            AppError::Database { message } => {
                error!(target: "app::command", %message, "database error in command");
                CommandError::new("UNKNOWN", message, None)
            }
            AppError::Serialization(error) => {
                error!(target: "app::command", error = %error, "serialization error in command");
                CommandError::new("UNKNOWN", "序列化失败", None)
            }
            AppError::Io(error) => {
                error!(target: "app::command", error = %error, "io error in command");
                CommandError::new("UNKNOWN", "文件系统读写失败", None)
            }
            AppError::Other(message) => {
                error!(target: "app::command", %message, "unexpected error in command");
                CommandError::new("UNKNOWN", message, None)
            }
        }
    }
}

pub(crate) fn parse_id(field: &str, raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|err| {
        AppError::validation_with_details(
            format!("{field} 不是有效的 UUID"),
            json!({ "field": field, "value": raw, "reason": err.to_string() }),
        )
    })
}
