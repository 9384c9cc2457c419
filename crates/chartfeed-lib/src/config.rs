//! Service configuration.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use chartfeed_upstream::ClientConfig;
use serde::{Deserialize, Serialize};

/// Every tunable of the history service.
///
/// [`Settings::from_env`] reads `CHARTFEED_*` variables; anything unset or
/// unparsable keeps its default.
///
/// | variable | field | default |
/// |---|---|---|
/// | `CHARTFEED_REDIS_URL` | `redis_url` | `redis://127.0.0.1:6379/0` |
/// | `CHARTFEED_BASE_CACHE_TTL_SECS` | `base_cache_ttl` | 6 h |
/// | `CHARTFEED_RESULT_TTL_SECS` | `result_ttl` | 1 h |
/// | `CHARTFEED_SESSION_TIMEOUT_SECS` | `session_timeout` | 30 min |
/// | `CHARTFEED_SESSION_MARKER_TTL_SECS` | `session_marker_ttl` | 45 min |
/// | `CHARTFEED_SWEEP_INTERVAL_SECS` | `sweep_interval` | 5 min |
/// | `CHARTFEED_INITIAL_PAGE_LIMIT` | `initial_page_limit` | 5000 |
/// | `CHARTFEED_FANOUT_WORKERS` | `fanout_workers` | 2 |
/// | `CHARTFEED_FANOUT_QUEUE` | `fanout_queue` | 64 |
/// | `CHARTFEED_UPSTREAM_URL` | `upstream.base_url` | `http://127.0.0.1:8700` |
/// | `CHARTFEED_UPSTREAM_API_KEY` | `upstream.api_key` | none |
/// | `CHARTFEED_UPSTREAM_TIMEOUT_SECS` | `upstream.timeout` | 120 s |
/// | `CHARTFEED_UPSTREAM_MAX_RETRIES` | `upstream.max_retries` | 3 |
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Redis connection URL.
    pub redis_url: String,
    /// Lifetime of a cached 1-second day entry.
    pub base_cache_ttl: Duration,
    /// Lifetime of materialized results and aggregated-range entries.
    pub result_ttl: Duration,
    /// Idle time after which a session is reclaimed by the sweep.
    pub session_timeout: Duration,
    /// Passive TTL on the session marker key.
    pub session_marker_ttl: Duration,
    /// Period of the expiry sweep.
    pub sweep_interval: Duration,
    /// Bars returned by the first page of a query.
    pub initial_page_limit: usize,
    /// Fan-out worker count.
    pub fanout_workers: usize,
    /// Fan-out queue capacity.
    pub fanout_queue: usize,
    /// Upstream gateway client.
    pub upstream: ClientConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379/0".to_string(),
            base_cache_ttl: Duration::from_secs(6 * 3600),
            result_ttl: Duration::from_secs(3600),
            session_timeout: Duration::from_secs(30 * 60),
            session_marker_ttl: Duration::from_secs(45 * 60),
            sweep_interval: Duration::from_secs(5 * 60),
            initial_page_limit: 5000,
            fanout_workers: 2,
            fanout_queue: 64,
            upstream: ClientConfig::default(),
        }
    }
}

impl Settings {
    /// Reads settings from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Reads settings through `lookup`, which maps a variable name to its value.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let mut upstream = defaults.upstream;
        if let Some(url) = var_str(&lookup, "CHARTFEED_UPSTREAM_URL") {
            upstream.base_url = url;
        }
        if let Some(key) = var_str(&lookup, "CHARTFEED_UPSTREAM_API_KEY") {
            upstream.api_key = Some(key);
        }
        upstream.timeout = var_secs(&lookup, "CHARTFEED_UPSTREAM_TIMEOUT_SECS", upstream.timeout);
        upstream.max_retries =
            var_parse(&lookup, "CHARTFEED_UPSTREAM_MAX_RETRIES").unwrap_or(upstream.max_retries);

        Self {
            redis_url: var_str(&lookup, "CHARTFEED_REDIS_URL").unwrap_or(defaults.redis_url),
            base_cache_ttl: var_secs(&lookup, "CHARTFEED_BASE_CACHE_TTL_SECS", defaults.base_cache_ttl),
            result_ttl: var_secs(&lookup, "CHARTFEED_RESULT_TTL_SECS", defaults.result_ttl),
            session_timeout: var_secs(
                &lookup,
                "CHARTFEED_SESSION_TIMEOUT_SECS",
                defaults.session_timeout,
            ),
            session_marker_ttl: var_secs(
                &lookup,
                "CHARTFEED_SESSION_MARKER_TTL_SECS",
                defaults.session_marker_ttl,
            ),
            sweep_interval: var_secs(&lookup, "CHARTFEED_SWEEP_INTERVAL_SECS", defaults.sweep_interval),
            initial_page_limit: var_parse(&lookup, "CHARTFEED_INITIAL_PAGE_LIMIT")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.initial_page_limit),
            fanout_workers: var_parse(&lookup, "CHARTFEED_FANOUT_WORKERS")
                .unwrap_or(defaults.fanout_workers),
            fanout_queue: var_parse(&lookup, "CHARTFEED_FANOUT_QUEUE")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.fanout_queue),
            upstream,
        }
    }
}

fn var_str(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn var_parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    lookup(name).and_then(|s| s.trim().parse().ok())
}

fn var_secs(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: Duration) -> Duration {
    var_parse(lookup, name).map_or(default, Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Settings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Settings::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[]);
        assert_eq!(s.redis_url, "redis://127.0.0.1:6379/0");
        assert_eq!(s.base_cache_ttl, Duration::from_secs(21_600));
        assert_eq!(s.result_ttl, Duration::from_secs(3600));
        assert_eq!(s.session_timeout, Duration::from_secs(1800));
        assert_eq!(s.session_marker_ttl, Duration::from_secs(2700));
        assert_eq!(s.initial_page_limit, 5000);
        assert!(s.upstream.api_key.is_none());
    }

    #[test]
    fn test_overrides_are_trimmed_and_parsed() {
        let s = settings(&[
            ("CHARTFEED_REDIS_URL", " redis://cache:6379/2 "),
            ("CHARTFEED_RESULT_TTL_SECS", "600"),
            ("CHARTFEED_INITIAL_PAGE_LIMIT", "250"),
            ("CHARTFEED_UPSTREAM_URL", "http://gateway:9000"),
            ("CHARTFEED_UPSTREAM_API_KEY", "secret"),
            ("CHARTFEED_UPSTREAM_MAX_RETRIES", "7"),
        ]);
        assert_eq!(s.redis_url, "redis://cache:6379/2");
        assert_eq!(s.result_ttl, Duration::from_secs(600));
        assert_eq!(s.initial_page_limit, 250);
        assert_eq!(s.upstream.base_url, "http://gateway:9000");
        assert_eq!(s.upstream.api_key.as_deref(), Some("secret"));
        assert_eq!(s.upstream.max_retries, 7);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let s = settings(&[
            ("CHARTFEED_SESSION_TIMEOUT_SECS", "half an hour"),
            ("CHARTFEED_INITIAL_PAGE_LIMIT", "0"),
            ("CHARTFEED_REDIS_URL", "   "),
        ]);
        assert_eq!(s.session_timeout, Duration::from_secs(1800));
        assert_eq!(s.initial_page_limit, 5000);
        assert_eq!(s.redis_url, "redis://127.0.0.1:6379/0");
    }

    #[test]
    fn test_settings_serialize() {
        let json = serde_json::to_value(Settings::default()).unwrap();
        assert_eq!(json["initial_page_limit"], 5000);
        assert_eq!(json["upstream"]["max_retries"], 3);
    }
}
