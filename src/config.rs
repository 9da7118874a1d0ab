// =============================================================================
// Runtime Configuration — Portfolio Analysis Backend
// =============================================================================
//
// Every tunable lives here so the rest of the crate never reads an
// environment variable directly. Everything has a sane default, so a bare
// `Config::from_env()` with no environment set up at all still boots.
// =============================================================================

use std::collections::HashMap;

use tracing::info;

/// Top-level process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Redis connection string (`redis://...`).
    pub store_url: String,

    /// Address the WebSocket/REST API binds to.
    pub bind_addr: String,

    /// Session document TTL, refreshed on every mutation.
    pub session_ttl_secs: u64,

    /// Period between Market Updater ticks.
    pub market_update_interval_secs: u64,

    /// Inclusive [min, max] artificial delay range for each metric kernel.
    pub metric_delay_range: (f64, f64),

    /// Base price used to seed the mock random walk for an unconfigured
    /// ticker.
    pub default_base_price: f64,

    /// Per-ticker base prices seeding the market-update random walk.
    pub base_prices: HashMap<String, f64>,

    /// Idle duration after which a Session Controller tears its connection
    /// down.
    pub idle_timeout_secs: u64,

    /// Timeout applied to every document-store call.
    pub store_call_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_url: "redis://127.0.0.1:6379".to_string(),
            bind_addr: "0.0.0.0:3002".to_string(),
            session_ttl_secs: 86_400,
            market_update_interval_secs: 30,
            metric_delay_range: (2.0, 5.0),
            default_base_price: 100.0,
            base_prices: default_base_prices(),
            idle_timeout_secs: 900,
            store_call_timeout_secs: 5,
        }
    }
}

fn default_base_prices() -> HashMap<String, f64> {
    [
        ("AAPL", 190.0),
        ("GOOGL", 140.0),
        ("MSFT", 410.0),
        ("AMZN", 178.0),
        ("TSLA", 245.0),
    ]
    .into_iter()
    .map(|(t, p)| (t.to_string(), p))
    .collect()
}

impl Config {
    /// Build a `Config` from environment variables, falling back to
    /// [`Config::default`] for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let store_url =
            std::env::var("PORTFOLIO_STORE_URL").unwrap_or(defaults.store_url.clone());
        let bind_addr =
            std::env::var("PORTFOLIO_BIND_ADDR").unwrap_or(defaults.bind_addr.clone());

        let session_ttl_secs = env_u64("PORTFOLIO_SESSION_TTL_SECS", defaults.session_ttl_secs);
        let market_update_interval_secs = env_u64(
            "PORTFOLIO_MARKET_UPDATE_INTERVAL_SECS",
            defaults.market_update_interval_secs,
        );
        let idle_timeout_secs =
            env_u64("PORTFOLIO_IDLE_TIMEOUT_SECS", defaults.idle_timeout_secs);
        let store_call_timeout_secs = env_u64(
            "PORTFOLIO_STORE_CALL_TIMEOUT_SECS",
            defaults.store_call_timeout_secs,
        );

        let metric_delay_min = env_f64("PORTFOLIO_METRIC_DELAY_MIN_SECS", defaults.metric_delay_range.0);
        let metric_delay_max = env_f64("PORTFOLIO_METRIC_DELAY_MAX_SECS", defaults.metric_delay_range.1);

        let config = Self {
            store_url,
            bind_addr,
            session_ttl_secs,
            market_update_interval_secs,
            metric_delay_range: (metric_delay_min, metric_delay_max),
            default_base_price: defaults.default_base_price,
            base_prices: defaults.base_prices,
            idle_timeout_secs,
            store_call_timeout_secs,
        };

        info!(
            store_url = %config.store_url,
            bind_addr = %config.bind_addr,
            session_ttl_secs = config.session_ttl_secs,
            market_update_interval_secs = config.market_update_interval_secs,
            idle_timeout_secs = config.idle_timeout_secs,
            "configuration loaded"
        );

        config
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = Config::default();
        assert_eq!(cfg.session_ttl_secs, 86_400);
        assert_eq!(cfg.market_update_interval_secs, 30);
        assert_eq!(cfg.metric_delay_range, (2.0, 5.0));
        assert_eq!(cfg.default_base_price, 100.0);
        assert!(cfg.base_prices.contains_key("AAPL"));
    }

    #[test]
    fn env_u64_falls_back_on_missing_or_bad_value() {
        assert_eq!(env_u64("PORTFOLIO_TEST_DOES_NOT_EXIST", 42), 42);
    }
}
