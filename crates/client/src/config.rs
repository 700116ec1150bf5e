//! Client configuration from environment variables.

use std::time::Duration;

/// Configuration for transport-level reconnects after a live connection drops.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of reconnect attempts (0 = infinite)
    pub max_attempts: u32,
    /// Initial delay in milliseconds
    pub initial_delay_ms: u32,
    /// Maximum delay in milliseconds
    pub max_delay_ms: u32,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 1.5,
        }
    }
}

impl ReconnectConfig {
    /// Calculate delay for a given attempt number
    pub fn delay_for_attempt(&self, attempt: u32) -> u32 {
        let delay = self.initial_delay_ms as f32 * self.backoff_multiplier.powi(attempt as i32);
        (delay as u32).min(self.max_delay_ms)
    }

    /// `true` once `attempt` reconnects have been spent.
    pub fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts > 0 && attempt >= self.max_attempts
    }
}

/// Everything the sync layer needs to know about its environment.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the REST API, e.g. `http://localhost:5000`.
    pub api_base: String,
    /// Path of the push hub relative to `api_base`.
    pub hub_path: String,
    /// Delay between credential availability and the first handshake.
    pub warmup: Duration,
    /// Delay before the single retry of a failed initial handshake.
    pub retry_delay: Duration,
    pub page_size: usize,
    /// Trailing debounce applied to push-triggered refetches.
    pub refetch_debounce: Duration,
    pub scan_poll_interval: Duration,
    pub scan_max_attempts: u32,
    pub reconnect: ReconnectConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:5000".to_string(),
            hub_path: "/hubs/access".to_string(),
            warmup: Duration::from_millis(500),
            retry_delay: Duration::from_millis(3000),
            page_size: 15,
            refetch_debounce: Duration::from_millis(300),
            scan_poll_interval: Duration::from_millis(1000),
            scan_max_attempts: 30,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Read configuration from the environment, falling back to defaults.
    ///
    /// Environment variables:
    /// - `LABGATE_API_BASE`: REST base URL (default: "http://localhost:5000")
    /// - `LABGATE_HUB_PATH`: push hub path (default: "/hubs/access")
    /// - `LABGATE_WARMUP_MS`, `LABGATE_RETRY_DELAY_MS`
    /// - `LABGATE_PAGE_SIZE`, `LABGATE_REFETCH_DEBOUNCE_MS`
    /// - `LABGATE_SCAN_POLL_MS`, `LABGATE_SCAN_MAX_ATTEMPTS`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_base: std::env::var("LABGATE_API_BASE").unwrap_or(defaults.api_base),
            hub_path: std::env::var("LABGATE_HUB_PATH").unwrap_or(defaults.hub_path),
            warmup: env_millis("LABGATE_WARMUP_MS").unwrap_or(defaults.warmup),
            retry_delay: env_millis("LABGATE_RETRY_DELAY_MS").unwrap_or(defaults.retry_delay),
            page_size: env_parse::<usize>("LABGATE_PAGE_SIZE")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.page_size),
            refetch_debounce: env_millis("LABGATE_REFETCH_DEBOUNCE_MS")
                .unwrap_or(defaults.refetch_debounce),
            scan_poll_interval: env_millis("LABGATE_SCAN_POLL_MS")
                .unwrap_or(defaults.scan_poll_interval),
            scan_max_attempts: env_parse("LABGATE_SCAN_MAX_ATTEMPTS")
                .unwrap_or(defaults.scan_max_attempts),
            reconnect: defaults.reconnect,
        }
    }

    /// WebSocket URL of the push hub (`http` → `ws`, `https` → `wss`).
    pub fn hub_url(&self) -> String {
        let base = self.api_base.trim_end_matches('/');
        let path = self.hub_path.trim_start_matches('/');
        let url = format!("{base}/{path}");
        if let Some(rest) = url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            url
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_millis(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_millis)
}
