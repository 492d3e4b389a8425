use anyhow::{anyhow, Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use common_auth::ClassConfig;

use crate::detector::ProfileTables;
use crate::sweeper::DEFAULT_SWEEP_INTERVAL;

const DEFAULT_ADMIN_TTL_SECS: u64 = 8 * 60 * 60;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub backend_url: String,
    pub anon_key: String,
    pub sweep_interval: Duration,
    /// Directory for the durable namespace; `None` keeps it in memory.
    pub storage_dir: Option<PathBuf>,
    pub admin: ClassConfig,
    pub lawyer: ClassConfig,
    pub profile_tables: ProfileTables,
    pub expiry_webhook_url: Option<String>,
    pub expiry_webhook_bearer: Option<String>,
    pub metrics_enabled: bool,
}

impl ClientConfig {
    pub fn new(backend_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            backend_url: backend_url.into(),
            anon_key: anon_key.into(),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            storage_dir: None,
            admin: ClassConfig::admin(),
            lawyer: ClassConfig::lawyer(),
            profile_tables: ProfileTables::default(),
            expiry_webhook_url: None,
            expiry_webhook_bearer: None,
            metrics_enabled: true,
        }
    }
}

pub fn load_client_config() -> Result<ClientConfig> {
    let backend_url = env::var("SESSION_BACKEND_URL")
        .ok()
        .and_then(|value| normalize_optional(&value))
        .ok_or_else(|| anyhow!("SESSION_BACKEND_URL must be set"))?;
    let anon_key = env::var("SESSION_BACKEND_ANON_KEY")
        .ok()
        .and_then(|value| normalize_optional(&value))
        .ok_or_else(|| anyhow!("SESSION_BACKEND_ANON_KEY must be set"))?;

    let mut config = ClientConfig::new(backend_url, anon_key);

    if let Some(secs) = secs_from_env("SESSION_SWEEP_INTERVAL_SECS")
        .context("Failed to parse SESSION_SWEEP_INTERVAL_SECS")?
    {
        config.sweep_interval = Duration::from_secs(secs.max(1));
    }

    config.storage_dir = env::var("SESSION_STORAGE_DIR")
        .ok()
        .and_then(|value| normalize_optional(&value))
        .map(PathBuf::from);

    let admin_ttl = secs_from_env("SESSION_ADMIN_TTL_SECS")
        .context("Failed to parse SESSION_ADMIN_TTL_SECS")?
        .unwrap_or(DEFAULT_ADMIN_TTL_SECS);
    config.admin = ClassConfig::admin().with_default_ttl(ttl_from_secs(admin_ttl));

    let lawyer_ttl = secs_from_env("SESSION_LAWYER_TTL_SECS")
        .context("Failed to parse SESSION_LAWYER_TTL_SECS")?;
    config.lawyer = ClassConfig::lawyer().with_default_ttl(lawyer_ttl.and_then(ttl_from_secs));

    if let Some(table) = env::var("SESSION_LAWYER_PROFILE_TABLE")
        .ok()
        .and_then(|value| normalize_optional(&value))
    {
        config.profile_tables.lawyer_table = table;
    }
    if let Some(table) = env::var("SESSION_USER_PROFILE_TABLE")
        .ok()
        .and_then(|value| normalize_optional(&value))
    {
        config.profile_tables.user_table = table;
    }

    config.expiry_webhook_url = env::var("SESSION_EXPIRY_WEBHOOK_URL")
        .ok()
        .and_then(|value| normalize_optional(&value));
    config.expiry_webhook_bearer = env::var("SESSION_EXPIRY_WEBHOOK_BEARER")
        .ok()
        .and_then(|value| normalize_optional(&value));
    config.metrics_enabled = bool_from_env("SESSION_METRICS_ENABLED").unwrap_or(true);

    Ok(config)
}

fn bool_from_env(key: &str) -> Option<bool> {
    env::var(key).ok().map(|value| {
        matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn secs_from_env(key: &str) -> Result<Option<u64>> {
    match env::var(key) {
        Ok(value) => parse_secs(&value),
        Err(_) => Ok(None),
    }
}

fn parse_secs(value: &str) -> Result<Option<u64>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<u64>()
        .map(Some)
        .map_err(|err| anyhow!("Invalid seconds value '{trimmed}': {err}"))
}

/// Zero disables the default lifetime.
fn ttl_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn normalize_optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
