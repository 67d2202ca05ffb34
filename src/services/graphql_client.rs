use std::time::{Duration as StdDuration, Instant};

use reqwest::StatusCode;
use serde_json::{json, Value as JsonValue};
use tokio::time::sleep;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult, Collaborator};

const BACKOFF_SCHEDULE: [StdDuration; 3] = [
    StdDuration::from_millis(0),
    StdDuration::from_millis(250),
    StdDuration::from_millis(1000),
];

/// Minimal GraphQL-over-HTTP client shared by the collaborator adapters.
#[derive(Debug, Clone)]
pub struct GraphQlClient {
    client: reqwest::Client,
    endpoint: String,
    collaborator: Collaborator,
}

impl GraphQlClient {
    pub fn try_new(
        collaborator: Collaborator,
        endpoint: &str,
        timeout: StdDuration,
    ) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Some(StdDuration::from_secs(90)))
            .build()
            .map_err(|err| AppError::other(format!("初始化 {collaborator} HTTP 客户端失败: {err}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            collaborator,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Posts the query and returns its `data` object. Retryable failures are
    /// retried on a short backoff before giving up.
    pub async fn query(&self, query: &str, variables: JsonValue) -> AppResult<JsonValue> {
        let correlation_id = Uuid::new_v4().to_string();
        let body = json!({ "query": query, "variables": variables });
        let mut last_error: Option<AppError> = None;

        for (attempt, delay) in BACKOFF_SCHEDULE.iter().enumerate() {
            if !delay.is_zero() {
                sleep(*delay).await;
            }

            debug!(
                target: "app::collaborator",
                collaborator = %self.collaborator,
                attempt = attempt + 1,
                correlation_id = %correlation_id,
                "sending graphql request"
            );

            let start = Instant::now();
            let (error, retryable) = match self.client.post(&self.endpoint).json(&body).send().await
            {
                Ok(resp) if resp.status().is_success() => {
                    let payload: JsonValue = resp.json().await.map_err(|err| {
                        AppError::collaborator_unavailable(
                            self.collaborator,
                            format!("响应解析失败: {err}"),
                            false,
                        )
                    })?;
                    debug!(
                        target: "app::collaborator",
                        collaborator = %self.collaborator,
                        correlation_id = %correlation_id,
                        latency_ms = start.elapsed().as_millis() as u64,
                        "graphql response received"
                    );
                    return self.extract_data(payload);
                }
                Ok(resp) => self.map_http_error(resp.status()),
                Err(err) => self.error_from_reqwest(err),
            };

            warn!(
                target: "app::collaborator",
                collaborator = %self.collaborator,
                correlation_id = %correlation_id,
                attempt = attempt + 1,
                retryable,
                "graphql request failed"
            );

            if !retryable || attempt == BACKOFF_SCHEDULE.len() - 1 {
                return Err(error);
            }
            last_error = Some(error);
        }

        Err(last_error.unwrap_or_else(|| {
            AppError::collaborator_unavailable(self.collaborator, "请求失败", true)
        }))
    }

    fn extract_data(&self, mut payload: JsonValue) -> AppResult<JsonValue> {
        let data = payload.get_mut("data").map(JsonValue::take);
        match data {
            Some(data) if !data.is_null() => {
                if let Some(errors) = payload.get("errors") {
                    warn!(
                        target: "app::collaborator",
                        collaborator = %self.collaborator,
                        errors = %errors,
                        "graphql response carried partial errors"
                    );
                }
                Ok(data)
            }
            _ => {
                let message = payload
                    .pointer("/errors/0/message")
                    .and_then(JsonValue::as_str)
                    .unwrap_or("响应缺少 data 字段")
                    .to_string();
                Err(AppError::collaborator_unavailable(
                    self.collaborator,
                    message,
                    false,
                ))
            }
        }
    }

    pub(crate) fn map_http_error(&self, status: StatusCode) -> (AppError, bool) {
        let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
        (
            AppError::collaborator_unavailable(
                self.collaborator,
                format!("服务返回状态码 {}", status.as_u16()),
                retryable,
            ),
            retryable,
        )
    }

    fn error_from_reqwest(&self, err: reqwest::Error) -> (AppError, bool) {
        if err.is_timeout() {
            (
                AppError::collaborator_unavailable(self.collaborator, "请求超时", true),
                true,
            )
        } else if err.is_connect() {
            (
                AppError::collaborator_unavailable(self.collaborator, "网络连接失败", true),
                true,
            )
        } else if let Some(status) = err.status() {
            self.map_http_error(status)
        } else {
            (
                AppError::collaborator_unavailable(
                    self.collaborator,
                    format!("请求失败: {err}"),
                    false,
                ),
                false,
            )
        }
    }
}
