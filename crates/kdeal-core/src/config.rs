use crate::app_config::{AppConfig, Environment, SelectionPolicyKind};
use crate::ConfigError;

pub const DEFAULT_SEO_TITLE_TEMPLATE: &str = "[brand] [title] - [discount]% Korting | KortingDeal.nl";

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so it can be tested with a pure
/// `HashMap` lookup.
#[allow(clippy::too_many_lines)]
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let optional = |var: &str| -> Option<String> {
        lookup(var).ok().filter(|v| !v.trim().is_empty())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_positive_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        let value = or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))?;
        if value == 0 {
            return Err(invalid(var, "must be greater than zero".to_string()));
        }
        Ok(value)
    };

    let parse_bool = |var: &str, default: bool| -> Result<bool, ConfigError> {
        match lookup(var) {
            Err(_) => Ok(default),
            Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                other => Err(invalid(var, format!("'{other}' is not a boolean"))),
            },
        }
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("KDEAL_ENV", "development"))?;

    let bind_addr = or_default("KDEAL_BIND_ADDR", "0.0.0.0:3000")
        .parse::<SocketAddr>()
        .map_err(|e| invalid("KDEAL_BIND_ADDR", e.to_string()))?;
    let log_level = or_default("KDEAL_LOG_LEVEL", "info");
    let categories_path = PathBuf::from(or_default(
        "KDEAL_CATEGORIES_PATH",
        "./config/categories.yaml",
    ));
    let api_keys: Vec<String> = or_default("KDEAL_API_KEYS", "")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect();

    let db_max_connections = parse_u32("KDEAL_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("KDEAL_DB_MIN_CONNECTIONS", "1")?;
    if db_min_connections > db_max_connections {
        return Err(invalid(
            "KDEAL_DB_MIN_CONNECTIONS",
            format!("{db_min_connections} exceeds KDEAL_DB_MAX_CONNECTIONS ({db_max_connections})"),
        ));
    }
    let db_acquire_timeout_secs = parse_u64("KDEAL_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let feed_url = optional("KDEAL_FEED_URL");
    let feed_request_timeout_secs = parse_u64("KDEAL_FEED_REQUEST_TIMEOUT_SECS", "120")?;
    let feed_user_agent = or_default("KDEAL_FEED_USER_AGENT", "KortingDeal-Sync/1.0");
    let feed_max_retries = parse_u32("KDEAL_FEED_MAX_RETRIES", "2")?;
    let feed_retry_backoff_base_secs = parse_u64("KDEAL_FEED_RETRY_BACKOFF_BASE_SECS", "5")?;

    let seo_title_template = optional("KDEAL_SEO_TITLE_TEMPLATE");
    let sync_policy = or_default("KDEAL_SYNC_POLICY", "full")
        .parse::<SelectionPolicyKind>()
        .map_err(|reason| invalid("KDEAL_SYNC_POLICY", reason))?;
    let sync_sample_size = parse_positive_usize("KDEAL_SYNC_SAMPLE_SIZE", "5000")?;
    let sync_batch_size = parse_positive_usize("KDEAL_SYNC_BATCH_SIZE", "100")?;
    let sync_chunk_size = parse_positive_usize("KDEAL_SYNC_CHUNK_SIZE", "5000")?;
    let sync_max_parse_rows = match optional("KDEAL_SYNC_MAX_PARSE_ROWS") {
        Some(_) => Some(parse_positive_usize("KDEAL_SYNC_MAX_PARSE_ROWS", "1")?),
        None => None,
    };
    let sync_progress_every = parse_positive_usize("KDEAL_SYNC_PROGRESS_EVERY", "1")?;
    let sync_deactivate_missing = parse_bool("KDEAL_SYNC_DEACTIVATE_MISSING", true)?;
    let sync_cron = optional("KDEAL_SYNC_CRON");

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        categories_path,
        api_keys,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        feed_url,
        feed_request_timeout_secs,
        feed_user_agent,
        feed_max_retries,
        feed_retry_backoff_base_secs,
        seo_title_template,
        sync_policy,
        sync_sample_size,
        sync_batch_size,
        sync_chunk_size,
        sync_max_parse_rows,
        sync_progress_every,
        sync_deactivate_missing,
        sync_cron,
    })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "KDEAL_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
