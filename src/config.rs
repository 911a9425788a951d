//! Runtime configuration, read from the environment (and `.env` via dotenv).

use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    /// Postgres connection string. Unset means the in-memory product store.
    pub database_url: Option<String>,

    pub verify_url: String,
    pub verify_timeout: Duration,
    /// Accept confirmed PDFs without asking the verifier. Testing only.
    pub verify_bypass: bool,

    /// SERP endpoint. Points at a local fixture in integration setups.
    pub search_endpoint: String,
    pub search_timeout: Duration,
    pub fetch_timeout: Duration,
    pub browser_enabled: bool,
    /// Bing market, e.g. `en-AU`. Drives `setlang`/`mkt` and `Accept-Language`.
    pub search_market: String,
    pub search_country: String,
    pub search_timezone: String,

    pub candidate_cache_ttl: Duration,
    pub sds_cache_ttl: Duration,
    pub hit_delay: Duration,
    pub max_hits: usize,
    pub top_links: usize,

    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            database_url: None,
            verify_url: "http://localhost:5001/verify-sds".to_string(),
            verify_timeout: Duration::from_secs(90),
            verify_bypass: false,
            search_endpoint: crate::search::BING_SEARCH_URL.to_string(),
            search_timeout: Duration::from_secs(15),
            fetch_timeout: Duration::from_secs(15),
            browser_enabled: true,
            search_market: "en-AU".to_string(),
            search_country: "AU".to_string(),
            search_timezone: "Australia/Sydney".to_string(),
            candidate_cache_ttl: Duration::from_secs(5 * 60),
            sds_cache_ttl: Duration::from_secs(10 * 60),
            hit_delay: Duration::from_millis(500),
            max_hits: 8,
            top_links: 5,
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: env_string("BIND_ADDR").unwrap_or(defaults.bind_addr),
            database_url: env_string("DATABASE_URL"),
            verify_url: env_string("SDS_VERIFY_URL").unwrap_or(defaults.verify_url),
            verify_timeout: env_secs("SDS_VERIFY_TIMEOUT_SECS", defaults.verify_timeout),
            verify_bypass: env_parse("SDS_VERIFY_BYPASS", defaults.verify_bypass),
            search_endpoint: env_string("SEARCH_ENDPOINT").unwrap_or(defaults.search_endpoint),
            search_timeout: env_secs("SEARCH_TIMEOUT_SECS", defaults.search_timeout),
            fetch_timeout: env_secs("FETCH_TIMEOUT_SECS", defaults.fetch_timeout),
            browser_enabled: env_parse("BROWSER_ENABLED", defaults.browser_enabled),
            search_market: env_string("SEARCH_MARKET").unwrap_or(defaults.search_market),
            search_country: env_string("SEARCH_COUNTRY").unwrap_or(defaults.search_country),
            search_timezone: env_string("SEARCH_TIMEZONE").unwrap_or(defaults.search_timezone),
            candidate_cache_ttl: env_secs("CANDIDATE_CACHE_TTL_SECS", defaults.candidate_cache_ttl),
            sds_cache_ttl: env_secs("SDS_CACHE_TTL_SECS", defaults.sds_cache_ttl),
            hit_delay: Duration::from_millis(env_parse(
                "HIT_DELAY_MS",
                defaults.hit_delay.as_millis() as u64,
            )),
            max_hits: env_parse("MAX_HITS", defaults.max_hits),
            top_links: env_parse("TOP_LINKS", defaults.top_links),
            request_timeout: env_secs("REQUEST_TIMEOUT_SECS", defaults.request_timeout),
        }
    }

    /// `Accept-Language` value for the configured market, e.g. `en-AU,en;q=0.9`.
    pub fn accept_language(&self) -> String {
        let primary = self
            .search_market
            .split('-')
            .next()
            .unwrap_or("en");
        format!("{},{};q=0.9", self.search_market, primary)
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match env_string(key) {
        Some(raw) => match raw.to_ascii_lowercase().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("Ignoring malformed {}={:?}, using default", key, raw);
                default
            }
        },
        None => default,
    }
}

fn env_secs(key: &str, default: Duration) -> Duration {
    Duration::from_secs(env_parse(key, default.as_secs()))
}
