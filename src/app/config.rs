use crate::app::AppError;

pub const DEFAULT_APP_ID: &str = "insert-key";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_id: String,
    pub owner_id: i64,
    pub http_bind: String,
    pub http_path: String,
    pub db_path: String,
    pub sync_base_url: String,
    pub sync_api_key: Option<String>,
    pub sync_offline: bool,
    pub sync_timeout_ms: u64,
    pub drain_interval_ms: u64,
}

impl AppConfig {
    /// Reads the environment; the first positional CLI argument overrides `APP_ID`.
    pub fn from_env() -> Result<Self, AppError> {
        let cli_app_id = std::env::args().nth(1);
        Self::from_lookup(|key| std::env::var(key).ok(), cli_app_id)
    }

    fn from_lookup<F>(lookup: F, cli_app_id: Option<String>) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let app_id = cli_app_id
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .or_else(|| non_empty(&lookup, "APP_ID"))
            .unwrap_or_else(|| DEFAULT_APP_ID.to_string());

        let http_path = non_empty(&lookup, "HTTP_PATH").unwrap_or_else(|| "/restdemo".to_string());
        if !http_path.starts_with('/') {
            return Err(AppError::config("HTTP_PATH must start with '/'"));
        }

        let drain_interval_ms = parse_or_default(&lookup, "DRAIN_INTERVAL_MS", 1000_u64)?;
        if drain_interval_ms == 0 {
            return Err(AppError::config("DRAIN_INTERVAL_MS must be greater than 0"));
        }

        Ok(Self {
            app_id,
            owner_id: parse_or_default(&lookup, "OWNER_ID", 1_i64)?,
            http_bind: non_empty(&lookup, "HTTP_BIND").unwrap_or_else(|| "0.0.0.0:9000".to_string()),
            http_path,
            db_path: non_empty(&lookup, "DB_PATH")
                .unwrap_or_else(|| "./data/restdemo.db".to_string()),
            sync_base_url: non_empty(&lookup, "SYNC_BASE_URL")
                .unwrap_or_else(|| "https://services.cloud.mongodb.com".to_string()),
            sync_api_key: non_empty(&lookup, "SYNC_API_KEY"),
            sync_offline: parse_flag(&lookup, "SYNC_OFFLINE")?,
            sync_timeout_ms: parse_or_default(&lookup, "SYNC_TIMEOUT_MS", 10_000_u64)?,
            drain_interval_ms,
        })
    }
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or_default<T, F>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr + Copy,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::config(format!("{key} must be a valid number"))),
        None => Ok(default),
    }
}

fn parse_flag<F>(lookup: &F, key: &str) -> Result<bool, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    match non_empty(lookup, key).map(|v| v.to_ascii_lowercase()).as_deref() {
        None | Some("0" | "false" | "no") => Ok(false),
        Some("1" | "true" | "yes") => Ok(true),
        Some(_) => Err(AppError::config(format!("{key} must be true or false"))),
    }
}
