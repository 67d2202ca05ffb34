use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{AppError, AppResult};

const DEFAULT_DATABASE_PATH: &str = "reward.sqlite";
const DEFAULT_CONTENT_SERVICE_URL: &str = "http://localhost:4001/graphql";
const DEFAULT_COURSE_SERVICE_URL: &str = "http://localhost:2001/graphql";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
const DEFAULT_BATCH_CONCURRENCY: usize = 4;
const DEFAULT_ACTIVITY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_NIGHTLY_RUN_HOUR: u32 = 3;

/// Tunables of the fitness dimension.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FitnessConfig {
    /// Largest share of the current value one batch cycle may take away.
    pub max_decrease_fraction: f64,
    /// Days after the last repetition at which the correctness modifier reaches zero.
    pub staleness_horizon_days: f64,
    /// Upper bound of the points regained per content item on review.
    pub max_regeneration_per_item: f64,
}

impl Default for FitnessConfig {
    fn default() -> Self {
        Self {
            max_decrease_fraction: 0.2,
            staleness_horizon_days: 30.0,
            max_regeneration_per_item: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringConfig {
    /// Maximum proportional boost health and fitness add to power.
    pub power_multiplier: f64,
    pub fitness: FitnessConfig,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            power_multiplier: 0.1,
            fitness: FitnessConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub database_path: PathBuf,
    pub log_dir: Option<PathBuf>,
    pub content_service_url: String,
    pub course_service_url: String,
    pub http_timeout: StdDuration,
    pub batch_concurrency: usize,
    pub activity_timeout: StdDuration,
    pub nightly_run_hour: u32,
    pub scoring: ScoringConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            log_dir: None,
            content_service_url: DEFAULT_CONTENT_SERVICE_URL.to_string(),
            course_service_url: DEFAULT_COURSE_SERVICE_URL.to_string(),
            http_timeout: StdDuration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
            activity_timeout: StdDuration::from_millis(DEFAULT_ACTIVITY_TIMEOUT_MS),
            nightly_run_hour: DEFAULT_NIGHTLY_RUN_HOUR,
            scoring: ScoringConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source; `from_env` uses
    /// the process environment.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let config = Self {
            database_path: text("REWARD_DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            log_dir: text("REWARD_LOG_DIR").map(PathBuf::from),
            content_service_url: text("REWARD_CONTENT_SERVICE_URL")
                .unwrap_or(defaults.content_service_url),
            course_service_url: text("REWARD_COURSE_SERVICE_URL")
                .unwrap_or(defaults.course_service_url),
            http_timeout: parse_or(&text, "REWARD_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)
                .map(StdDuration::from_secs)?,
            batch_concurrency: parse_or(
                &text,
                "REWARD_BATCH_CONCURRENCY",
                defaults.batch_concurrency,
            )?,
            activity_timeout: parse_or(
                &text,
                "REWARD_ACTIVITY_TIMEOUT_MS",
                DEFAULT_ACTIVITY_TIMEOUT_MS,
            )
            .map(StdDuration::from_millis)?,
            nightly_run_hour: parse_or(&text, "REWARD_NIGHTLY_RUN_HOUR", defaults.nightly_run_hour)?,
            scoring: ScoringConfig {
                power_multiplier: parse_or(
                    &text,
                    "REWARD_POWER_MULTIPLIER",
                    defaults.scoring.power_multiplier,
                )?,
                fitness: FitnessConfig {
                    max_decrease_fraction: parse_or(
                        &text,
                        "REWARD_FITNESS_MAX_DECREASE_FRACTION",
                        defaults.scoring.fitness.max_decrease_fraction,
                    )?,
                    staleness_horizon_days: parse_or(
                        &text,
                        "REWARD_FITNESS_STALENESS_HORIZON_DAYS",
                        defaults.scoring.fitness.staleness_horizon_days,
                    )?,
                    max_regeneration_per_item: parse_or(
                        &text,
                        "REWARD_FITNESS_MAX_REGENERATION_PER_ITEM",
                        defaults.scoring.fitness.max_regeneration_per_item,
                    )?,
                },
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.batch_concurrency == 0 {
            return Err(AppError::validation("批量并发数必须大于 0"));
        }
        if self.nightly_run_hour > 23 {
            return Err(AppError::validation_with_details(
                "夜间任务时间无效",
                json!({ "nightlyRunHour": self.nightly_run_hour }),
            ));
        }
        if self.scoring.power_multiplier < 0.0 {
            return Err(AppError::validation("power 系数不能为负数"));
        }
        let fitness = &self.scoring.fitness;
        if !(0.0..=1.0).contains(&fitness.max_decrease_fraction) {
            return Err(AppError::validation_with_details(
                "fitness 最大衰减比例必须在 0 到 1 之间",
                json!({ "maxDecreaseFraction": fitness.max_decrease_fraction }),
            ));
        }
        if fitness.staleness_horizon_days <= 0.0 {
            return Err(AppError::validation("fitness 遗忘周期必须大于 0"));
        }
        if fitness.max_regeneration_per_item < 0.0 {
            return Err(AppError::validation("fitness 恢复上限不能为负数"));
        }
        Ok(())
    }
}

fn parse_or<T, F>(text: &F, key: &str, default: T) -> AppResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match text(key) {
        Some(raw) => raw.parse::<T>().map_err(|err| {
            AppError::validation_with_details(
                format!("环境变量 {key} 无效: {err}"),
                json!({ "key": key, "value": raw }),
            )
        }),
        None => Ok(default),
    }
}
