use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::commands::AppState;
use crate::error::AppError;
use crate::models::event::{CloudEvent, ContentProgressedEvent};
use crate::services::reward_service::ActivityOutcome;

/// Answer to the pub/sub transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    Success,
    /// Redeliver later.
    Retry,
    /// Dead-letter; redelivery cannot succeed.
    Drop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionAck {
    pub status: SubscriptionStatus,
}

impl SubscriptionAck {
    fn new(status: SubscriptionStatus) -> Self {
        Self { status }
    }
}

/// Handles one `content-progressed` delivery.
pub async fn on_content_progressed(state: &AppState, body: &[u8]) -> SubscriptionAck {
    let envelope: CloudEvent<ContentProgressedEvent> = match serde_json::from_slice(body) {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!(target: "app::subscription", error = %err, "undecodable content-progressed event");
            return SubscriptionAck::new(SubscriptionStatus::Drop);
        }
    };

    let Some(event) = envelope.data else {
        warn!(
            target: "app::subscription",
            event_id = ?envelope.id,
            "content-progressed event without data"
        );
        return SubscriptionAck::new(SubscriptionStatus::Drop);
    };

    let timeout = state.activity_timeout();
    let service = state.rewards();
    let result = match tokio::time::timeout(
        timeout,
        service.calculate_scores_on_content_worked_on(&event),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(AppError::timeout(
            "content-progressed",
            u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        )),
    };

    let status = match result {
        Ok(ActivityOutcome::Applied(_)) => {
            info!(
                target: "app::subscription",
                user_id = %event.user_id,
                content_id = %event.content_id,
                "reward scores updated from activity"
            );
            SubscriptionStatus::Success
        }
        Ok(ActivityOutcome::Duplicate) => SubscriptionStatus::Success,
        Err(err) => status_for_error(&err),
    };

    SubscriptionAck::new(status)
}

fn status_for_error(err: &AppError) -> SubscriptionStatus {
    if err.is_retryable() || matches!(err, AppError::Conflict { .. }) {
        warn!(target: "app::subscription", error = %err, "activity processing failed, retrying");
        SubscriptionStatus::Retry
    } else {
        error!(target: "app::subscription", error = %err, "activity processing failed permanently");
        SubscriptionStatus::Drop
    }
}
