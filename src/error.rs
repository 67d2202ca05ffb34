use std::fmt;

use rusqlite;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{error, warn};

pub type AppResult<T> = Result<T, AppError>;

/// Remote services the engine depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collaborator {
    ContentService,
    CourseService,
}

impl Collaborator {
    pub fn as_str(self) -> &'static str {
        match self {
            Collaborator::ContentService => "content_service",
            Collaborator::CourseService => "course_service",
        }
    }
}

impl fmt::Display for Collaborator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("数据库错误: {message}")]
    Database { message: String },

    #[error("记录未找到")]
    NotFound,

    #[error("记录冲突: {message}")]
    Conflict { message: String },

    #[error("验证失败: {message}")]
    Validation {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        details: Option<JsonValue>,
    },

    #[error("外部服务不可用: {collaborator} - {message}")]
    CollaboratorUnavailable {
        collaborator: Collaborator,
        message: String,
        retryable: bool,
    },

    #[error("无效的课程或用户范围: {message}")]
    InvalidScope { message: String },

    #[error("操作超时: {operation} ({after_ms} ms)")]
    Timeout { operation: String, after_ms: u64 },

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(target: "app::validation", %message, "validation error");
        AppError::Validation {
            message,
            source: None,
            details: None,
        }
    }

    pub fn validation_with_details(message: impl Into<String>, details: JsonValue) -> Self {
        let message = message.into();
        warn!(target: "app::validation", %message, details = %details, "validation error with details");
        AppError::Validation {
            message,
            source: None,
            details: Some(details),
        }
    }

    pub fn collaborator_unavailable(
        collaborator: Collaborator,
        message: impl Into<String>,
        retryable: bool,
    ) -> Self {
        let message = message.into();
        warn!(
            target: "app::collaborator",
            collaborator = %collaborator,
            retryable,
            %message,
            "collaborator unavailable"
        );
        AppError::CollaboratorUnavailable {
            collaborator,
            message,
            retryable,
        }
    }

    pub fn invalid_scope(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(target: "app::scope", %message, "invalid scope");
        AppError::InvalidScope { message }
    }

    pub fn timeout(operation: impl Into<String>, after_ms: u64) -> Self {
        let operation = operation.into();
        warn!(target: "app::timeout", %operation, after_ms, "operation timed out");
        AppError::Timeout {
            operation,
            after_ms,
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(target: "app::conflict", %message, "conflict error");
        AppError::Conflict { message }
    }

    pub fn not_found() -> Self {
        warn!(target: "app::database", "resource not found");
        AppError::NotFound
    }

    pub fn database(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(target: "app::database", %message, "database error");
        AppError::Database { message }
    }

    pub fn other(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(target: "app::other", %message, "other error");
        AppError::Other(message)
    }

    /// Whether the caller (scheduler or event transport) should try again later.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::CollaboratorUnavailable { retryable, .. } => *retryable,
            AppError::Timeout { .. } | AppError::Database { .. } | AppError::Io(_) => true,
            _ => false,
        }
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(error: rusqlite::Error) -> Self {
        use rusqlite::Error::{QueryReturnedNoRows, SqliteFailure};
        use rusqlite::ErrorCode;

        match &error {
            QueryReturnedNoRows => AppError::not_found(),
            SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation => {
                AppError::conflict("违反唯一性或约束限制")
            }
            _ => {
                error!(target: "app::database", error = ?error, "sqlite error");
                AppError::database(error.to_string())
            }
        }
    }
}
