use tracing_subscriber::{EnvFilter, fmt};

use crate::app::AppError;

/// Used when `RUST_LOG` is unset or unparsable. Keeps actix worker and
/// reqwest connection chatter out of the ingest log.
const DEFAULT_FILTER: &str = "info,actix_server=warn,reqwest=warn";

pub fn init() -> Result<(), AppError> {
    fmt()
        .with_env_filter(filter_from(std::env::var("RUST_LOG").ok().as_deref()))
        .with_target(true)
        .with_thread_names(true)
        .try_init()
        .map_err(AppError::logging_init)
}

fn filter_from(directives: Option<&str>) -> EnvFilter {
    directives
        .filter(|value| !value.trim().is_empty())
        .and_then(|value| EnvFilter::try_new(value).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}
