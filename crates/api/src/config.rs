use std::str::FromStr;
use std::time::Duration;

use chrono::Datelike;
use sculpt_core::session::SessionCode;
use sculpt_core::warming::{WarmingStrategy, POPULAR_PARTICIPANTS};
use sculpt_pipeline::{PipelineConfig, WarmingConfig};
use sculpt_store::CacheTtls;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development. Only the
/// binary reads the environment; library crates receive the typed
/// sub-configs.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Drain budget for background tasks on shutdown (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// PostgreSQL store when set, in-memory store otherwise.
    pub database_url: Option<String>,
    pub cache_key_prefix: String,
    pub cache_ttls: CacheTtls,
    pub task_ttl: Duration,
    pub pipeline: PipelineConfig,
    pub upstream_url: String,
    pub upstream_timeout: Duration,
    pub warming_enabled: bool,
    pub warming: WarmingConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                    |
    /// |----------------------------|----------------------------|
    /// | `HOST`                     | `0.0.0.0`                  |
    /// | `PORT`                     | `3000`                     |
    /// | `CORS_ORIGINS`             | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`     | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`    | `30`                       |
    /// | `DATABASE_URL`             | unset (in-memory store)    |
    /// | `CACHE_KEY_PREFIX`         | `f1`                       |
    /// | `SCULPTURE_CACHE_TTL_SECS` | `604800`                   |
    /// | `SESSION_CACHE_TTL_SECS`   | `86400`                    |
    /// | `TASK_RESULT_TTL_SECS`     | `3600`                     |
    /// | `MAX_CONCURRENT_JOBS`      | `4`                        |
    /// | `STRICT_SINGLE_FLIGHT`     | `false`                    |
    /// | `UPSTREAM_URL`             | `http://localhost:8000`    |
    /// | `UPSTREAM_TIMEOUT_SECS`    | `90`                       |
    /// | `WARMING_ENABLED`          | `true`                     |
    /// | `WARMING_INTERVAL_SECS`    | `604800`                   |
    /// | `WARMING_RECENT_ROUNDS`    | `3`                        |
    /// | `WARMING_SESSIONS`         | `Q,R`                      |
    /// | `WARMING_PARTICIPANTS`     | 15 popular codes           |
    /// | `WARMING_MAX_CONCURRENT`   | `5`                        |
    /// | `WARMING_JOB_TIMEOUT_SECS` | `120`                      |
    ///
    /// Panics on malformed values.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = parse_var("PORT", "3000");

        let cors_origins = list_var("CORS_ORIGINS", "http://localhost:5173");

        let request_timeout_secs: u64 = parse_var("REQUEST_TIMEOUT_SECS", "30");
        let shutdown_timeout_secs: u64 = parse_var("SHUTDOWN_TIMEOUT_SECS", "30");

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let cache_key_prefix =
            std::env::var("CACHE_KEY_PREFIX").unwrap_or_else(|_| "f1".into());
        let cache_ttls = CacheTtls {
            artifact: Duration::from_secs(parse_var("SCULPTURE_CACHE_TTL_SECS", "604800")),
            session: Duration::from_secs(parse_var("SESSION_CACHE_TTL_SECS", "86400")),
        };
        let task_ttl = Duration::from_secs(parse_var("TASK_RESULT_TTL_SECS", "3600"));

        let pipeline = PipelineConfig {
            max_concurrent_jobs: parse_var("MAX_CONCURRENT_JOBS", "4"),
            strict_single_flight: parse_var("STRICT_SINGLE_FLIGHT", "false"),
        };

        let upstream_url =
            std::env::var("UPSTREAM_URL").unwrap_or_else(|_| "http://localhost:8000".into());
        let upstream_timeout = Duration::from_secs(parse_var("UPSTREAM_TIMEOUT_SECS", "90"));

        let warming_enabled: bool = parse_var("WARMING_ENABLED", "true");
        let sessions = list_var("WARMING_SESSIONS", "Q,R")
            .iter()
            .map(|code| {
                SessionCode::from_str(code)
                    .unwrap_or_else(|e| panic!("WARMING_SESSIONS is invalid: {e}"))
            })
            .collect();
        let participants = list_var("WARMING_PARTICIPANTS", &POPULAR_PARTICIPANTS.join(","));

        let strategy = WarmingStrategy {
            season: chrono::Utc::now().year(),
            recent_rounds: parse_var("WARMING_RECENT_ROUNDS", "3"),
            sessions,
            participants,
            max_concurrent: parse_var("WARMING_MAX_CONCURRENT", "5"),
        }
        .validated()
        .unwrap_or_else(|e| panic!("Invalid warming configuration: {e}"));

        let warming = WarmingConfig {
            interval: Duration::from_secs(parse_var("WARMING_INTERVAL_SECS", "604800")),
            job_timeout: Duration::from_secs(parse_var("WARMING_JOB_TIMEOUT_SECS", "120")),
            strategy,
        };

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            database_url,
            cache_key_prefix,
            cache_ttls,
            task_ttl,
            pipeline,
            upstream_url,
            upstream_timeout,
            warming_enabled,
            warming,
        }
    }

    /// `UPSTREAM_URL=fixture:` serves the built-in 2024 fixture season
    /// instead of calling a remote provider.
    pub fn uses_fixture_upstream(&self) -> bool {
        self.upstream_url.starts_with("fixture:")
    }
}

fn parse_var<T>(name: &str, default: &str) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    std::env::var(name)
        .unwrap_or_else(|_| default.into())
        .trim()
        .parse()
        .unwrap_or_else(|e| panic!("{name} must be a valid {}: {e}", std::any::type_name::<T>()))
}

fn list_var(name: &str, default: &str) -> Vec<String> {
    std::env::var(name)
        .unwrap_or_else(|_| default.into())
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
