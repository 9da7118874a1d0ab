// =============================================================================
// Portfolio Repository — typed facade over the State Gateway
// =============================================================================
//
// Validates inputs, converts to/from the document shape, delegates all
// atomicity guarantees to the Gateway. No business logic lives here, and no
// retries beyond the Gateway's own single script-reregister retry.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::OnceLock;

use chrono::Utc;
use regex::Regex;

use crate::error::{ProtocolError, StoreError};
use crate::portfolio::document::{PortfolioDocument, ResultRecord};
use crate::store::Gateway;

fn ticker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z][A-Z0-9.]{0,9}$").expect("valid ticker regex"))
}

/// Validate a ticker against `[A-Z][A-Z0-9.]{0,9}`.
pub fn validate_ticker(ticker: &str) -> Result<(), ProtocolError> {
    if ticker_regex().is_match(ticker) {
        Ok(())
    } else {
        Err(ProtocolError::InvalidTicker(ticker.to_string()))
    }
}

pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

pub struct PortfolioRepository<G: Gateway> {
    gateway: Arc<G>,
}

impl<G: Gateway> PortfolioRepository<G> {
    pub fn new(gateway: Arc<G>) -> Self {
        Self { gateway }
    }

    /// Create-if-absent. Idempotent: if the key already exists, returns the
    /// existing document unchanged.
    pub async fn ensure(
        &self,
        session_id: &str,
        initial_holdings: HashMap<String, i64>,
    ) -> Result<PortfolioDocument, StoreError> {
        for (ticker, shares) in &initial_holdings {
            debug_assert!(*shares >= 0, "negative share count for {ticker}");
        }

        let now = now_iso8601();
        let mut initial = PortfolioDocument::new(session_id, now);
        initial.holdings = initial_holdings;

        self.gateway.ensure(session_id, &initial).await
    }

    pub async fn read(&self, session_id: &str) -> Result<PortfolioDocument, StoreError> {
        self.gateway.read(session_id).await
    }

    /// Atomically sets `current_analysis` and refreshes `last_activity`,
    /// returning the full post-mutation document (the snapshot the
    /// Analysis Engine will hand to all five metric kernels).
    pub async fn begin_analysis(
        &self,
        session_id: &str,
        ticker: &str,
    ) -> Result<PortfolioDocument, StoreError> {
        let started_at = now_iso8601();
        self.gateway
            .begin_analysis(session_id, ticker, &started_at)
            .await
    }

    /// Atomically appends one result and refreshes `last_activity`.
    pub async fn append_result(
        &self,
        session_id: &str,
        result: ResultRecord,
    ) -> Result<(), StoreError> {
        let last_activity = now_iso8601();
        self.gateway
            .append_result(session_id, &result, &last_activity)
            .await
    }

    /// Atomically recomputes `total_value` from `holdings` and the given
    /// mock prices, returning the new value.
    pub async fn apply_market_update(
        &self,
        session_id: &str,
        prices: &HashMap<String, f64>,
    ) -> Result<f64, StoreError> {
        let last_activity = now_iso8601();
        self.gateway
            .apply_market_update(session_id, prices, &last_activity)
            .await
    }

    pub async fn list_sessions(&self) -> Result<Vec<String>, StoreError> {
        self.gateway.list_sessions().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticker_regex_accepts_valid_forms() {
        assert!(validate_ticker("AAPL").is_ok());
        assert!(validate_ticker("A").is_ok());
        assert!(validate_ticker("BRK.B").is_ok());
        assert!(validate_ticker("A1234567890").is_err()); // too long (11 chars after first)
        assert!(validate_ticker("A123456789").is_ok()); // exactly 10 chars total
    }

    #[test]
    fn ticker_regex_rejects_invalid_forms() {
        assert!(validate_ticker("").is_err());
        assert!(validate_ticker("aapl").is_err());
        assert!(validate_ticker("1AAPL").is_err());
        assert!(validate_ticker("AAPL!").is_err());
        assert!(validate_ticker("AAPL-B").is_err());
    }

    #[test]
    fn now_iso8601_is_rfc3339() {
        let ts = now_iso8601();
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }
}
