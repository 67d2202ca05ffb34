pub mod processed_event_repository;
pub mod reward_score_repository;
