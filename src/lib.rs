pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

use tracing::{error, info};

use crate::config::EngineConfig;

pub fn run() {
    if let Err(error) = try_run() {
        eprintln!("failed to launch reward service: {error}");
        std::process::exit(1);
    }
}

fn try_run() -> Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig::from_env()?;
    crate::utils::logger::init_logging(config.log_dir.as_deref())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let pool = crate::db::DbPool::new(&config.database_path)?;
        let state = crate::commands::AppState::new(pool, &config)?;
        state.rewards().ensure_nightly_job()?;

        info!(
            target: "app::reward",
            database = %config.database_path.display(),
            content_service = %config.content_service_url,
            course_service = %config.course_service_url,
            "reward service started"
        );

        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(target: "app::reward", error = %err, "failed to listen for shutdown signal");
        }
        info!(target: "app::reward", "reward service shutting down");
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}
