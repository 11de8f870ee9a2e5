use std::time::Duration;

use thiserror::Error;

pub const STALE_TIME_VAR: &str = "LEDGER_CACHE_STALE_MS";
pub const GC_TIME_VAR: &str = "LEDGER_CACHE_GC_MS";
pub const PAGE_SIZE_VAR: &str = "LEDGER_CACHE_PAGE_SIZE";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}")]
    Invalid { var: &'static str, value: String },
}

/// Freshness and eviction settings for a [`QueryCache`](crate::QueryCache).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// How long fetched data is served without refetching.
    pub stale_time: Duration,
    /// Grace period after the freshness window before an unobserved entry is evicted.
    pub gc_time: Duration,
    pub default_page_size: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_time: Duration::from_secs(30),
            gc_time: Duration::from_secs(5 * 60),
            default_page_size: 20,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    pub fn with_gc_time(mut self, gc_time: Duration) -> Self {
        self.gc_time = gc_time;
        self
    }

    pub fn with_page_size(mut self, size: u32) -> Self {
        self.default_page_size = size;
        self
    }

    /// Defaults overridden by `LEDGER_CACHE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(ms) = parse_var(&lookup, STALE_TIME_VAR)? {
            config.stale_time = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var(&lookup, GC_TIME_VAR)? {
            config.gc_time = Duration::from_millis(ms);
        }
        if let Some(size) = parse_var(&lookup, PAGE_SIZE_VAR)? {
            if size == 0 {
                return Err(ConfigError::Invalid {
                    var: PAGE_SIZE_VAR,
                    value: size.to_string(),
                });
            }
            config.default_page_size = u32::try_from(size).map_err(|_| ConfigError::Invalid {
                var: PAGE_SIZE_VAR,
                value: size.to_string(),
            })?;
        }
        Ok(config)
    }
}

fn parse_var(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<u64>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value: raw }),
    }
}
