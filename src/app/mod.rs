pub mod config;
mod error;
mod logging;
pub(crate) mod runtime;
pub mod services;

pub use error::AppError;

pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    logging::init()?;

    let config = config::AppConfig::from_env()?;

    tracing::info!(
        app_id = %config.app_id,
        owner_id = config.owner_id,
        http_bind = %config.http_bind,
        http_path = %config.http_path,
        db_path = %config.db_path,
        sync_base_url = %config.sync_base_url,
        sync_api_key_set = config.sync_api_key.is_some(),
        sync_offline = config.sync_offline,
        drain_interval_ms = config.drain_interval_ms,
        "application bootstrap initialized"
    );

    runtime::run(config)
}
