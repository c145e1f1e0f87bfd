//! Настройки HTTP-сервиса из переменных окружения `DFML_*`

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub bind: SocketAddr,
    /// Предел строк в каждой входной таблице и в `row_limit` запроса
    pub max_rows: usize,
    pub max_body_mb: usize,
    pub job_ttl: Duration,
    pub job_capacity: usize,
    pub fuse_timeout: Duration,
    /// Пустой список отключает CORS, `*` разрешает любой источник
    pub cors_origins: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8000)),
            max_rows: 200_000,
            max_body_mb: 50,
            job_ttl: Duration::from_secs(3600),
            job_capacity: 1000,
            fuse_timeout: Duration::from_secs(300),
            cors_origins: Vec::new(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let settings = Self {
            bind: parse_or(&lookup, "DFML_BIND", defaults.bind)?,
            max_rows: parse_or(&lookup, "DFML_MAX_ROWS", defaults.max_rows)?,
            max_body_mb: parse_or(&lookup, "DFML_MAX_BODY_MB", defaults.max_body_mb)?,
            job_ttl: Duration::from_secs(parse_or(
                &lookup,
                "DFML_JOB_TTL_SECS",
                defaults.job_ttl.as_secs(),
            )?),
            job_capacity: parse_or(&lookup, "DFML_JOB_CAPACITY", defaults.job_capacity)?,
            fuse_timeout: Duration::from_secs(parse_or(
                &lookup,
                "DFML_FUSE_TIMEOUT_SECS",
                defaults.fuse_timeout.as_secs(),
            )?),
            cors_origins: lookup("DFML_CORS_ORIGINS")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or(defaults.cors_origins),
        };

        if settings.max_rows == 0 || settings.max_body_mb == 0 || settings.job_capacity == 0 {
            anyhow::bail!("DFML_MAX_ROWS, DFML_MAX_BODY_MB and DFML_JOB_CAPACITY must be positive");
        }
        Ok(settings)
    }

    pub fn body_limit_bytes(&self) -> usize {
        self.max_body_mb.saturating_mul(1024 * 1024)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: '{}'", key, raw)),
        None => Ok(default),
    }
}
