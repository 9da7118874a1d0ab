// =============================================================================
// State Gateway — the only component that mutates the document store
// =============================================================================
//
// Exposes six typed operations, each a single server-side atomic script
// (§ `store::scripts`) invoked by content-addressed handle
// (`redis::Script` computes and caches the SHA1 hash for us and already
// falls back from `EVALSHA` to a full `EVAL` on `NOSCRIPT`, which is the
// "re-register and retry exactly once" contract — see DESIGN.md). Scripts
// are additionally pre-loaded once at `StateGateway::new` via `SCRIPT LOAD`
// so steady-state calls hit `EVALSHA` directly.
//
// Every call is wrapped in a transport-level timeout.
// =============================================================================

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::StoreError;
use crate::portfolio::document::{CurrentAnalysis, PortfolioDocument, ResultRecord};
use crate::store::scripts;

fn session_key(session_id: &str) -> String {
    format!("portfolio:{session_id}")
}

/// The narrow interface the rest of the crate consumes. Exists so tests can
/// substitute an in-memory fake without spinning up a real document store.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn ensure(
        &self,
        session_id: &str,
        initial: &PortfolioDocument,
    ) -> Result<PortfolioDocument, StoreError>;

    async fn read(&self, session_id: &str) -> Result<PortfolioDocument, StoreError>;

    async fn begin_analysis(
        &self,
        session_id: &str,
        ticker: &str,
        started_at: &str,
    ) -> Result<PortfolioDocument, StoreError>;

    async fn append_result(
        &self,
        session_id: &str,
        result: &ResultRecord,
        last_activity: &str,
    ) -> Result<(), StoreError>;

    async fn apply_market_update(
        &self,
        session_id: &str,
        prices: &HashMap<String, f64>,
        last_activity: &str,
    ) -> Result<f64, StoreError>;

    async fn list_sessions(&self) -> Result<Vec<String>, StoreError>;
}

pub struct StateGateway {
    conn: ConnectionManager,
    ttl_secs: u64,
    call_timeout: Duration,
    ensure_script: Script,
    read_script: Script,
    begin_analysis_script: Script,
    append_result_script: Script,
    apply_market_update_script: Script,
}

impl StateGateway {
    /// Connect to the document store and register all scripts.
    ///
    /// A failure here is a fatal startup failure (§7 class 5): the caller
    /// should propagate it out of `bootstrap::init` and exit non-zero.
    pub async fn new(config: &Config) -> Result<Self, StoreError> {
        let client = redis::Client::open(config.store_url.as_str())?;
        let mut conn = ConnectionManager::new(client).await?;

        let gateway = Self {
            conn: conn.clone(),
            ttl_secs: config.session_ttl_secs,
            call_timeout: Duration::from_secs(config.store_call_timeout_secs),
            ensure_script: Script::new(scripts::ENSURE),
            read_script: Script::new(scripts::READ),
            begin_analysis_script: Script::new(scripts::BEGIN_ANALYSIS),
            append_result_script: Script::new(scripts::APPEND_RESULT),
            apply_market_update_script: Script::new(scripts::APPLY_MARKET_UPDATE),
        };

        for (label, src) in scripts::ALL {
            match redis::cmd("SCRIPT")
                .arg("LOAD")
                .arg(*src)
                .query_async::<_, String>(&mut conn)
                .await
            {
                Ok(sha) => debug!(script = %label, sha = %sha, "registered store script"),
                Err(e) => warn!(script = %label, error = %e, "failed to pre-register store script, will lazy-load on first call"),
            }
        }

        info!(url = %config.store_url, "document store connection established");
        Ok(gateway)
    }

    async fn with_timeout<T>(
        &self,
        fut: impl std::future::Future<Output = redis::RedisResult<T>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => Err(StoreError::Transport(e)),
            Err(_) => Err(StoreError::Timeout),
        }
    }
}

#[async_trait]
impl Gateway for StateGateway {
    async fn ensure(
        &self,
        session_id: &str,
        initial: &PortfolioDocument,
    ) -> Result<PortfolioDocument, StoreError> {
        let key = session_key(session_id);
        let initial_json = serde_json::to_string(initial)
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        let mut conn = self.conn.clone();
        let doc_json: String = self
            .with_timeout(
                self.ensure_script
                    .key(&key)
                    .arg(&initial_json)
                    .arg(self.ttl_secs)
                    .invoke_async(&mut conn),
            )
            .await?;

        serde_json::from_str(&doc_json).map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn read(&self, session_id: &str) -> Result<PortfolioDocument, StoreError> {
        let key = session_key(session_id);
        let mut conn = self.conn.clone();

        let reply: Option<String> = self
            .with_timeout(
                self.read_script
                    .key(&key)
                    .arg(self.ttl_secs)
                    .invoke_async(&mut conn),
            )
            .await?;

        let doc_json = reply.ok_or(StoreError::NotFound)?;
        serde_json::from_str(&doc_json).map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn begin_analysis(
        &self,
        session_id: &str,
        ticker: &str,
        started_at: &str,
    ) -> Result<PortfolioDocument, StoreError> {
        let key = session_key(session_id);
        let current = CurrentAnalysis {
            ticker: ticker.to_string(),
            started_at: started_at.to_string(),
        };
        let current_json =
            serde_json::to_string(&current).map_err(|e| StoreError::Decode(e.to_string()))?;
        let started_at_json =
            serde_json::to_string(&started_at).map_err(|e| StoreError::Decode(e.to_string()))?;

        let mut conn = self.conn.clone();
        let reply: Option<String> = self
            .with_timeout(
                self.begin_analysis_script
                    .key(&key)
                    .arg(&current_json)
                    .arg(&started_at_json)
                    .arg(self.ttl_secs)
                    .invoke_async(&mut conn),
            )
            .await?;

        let doc_json = reply.ok_or(StoreError::NotFound)?;
        serde_json::from_str(&doc_json).map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn append_result(
        &self,
        session_id: &str,
        result: &ResultRecord,
        last_activity: &str,
    ) -> Result<(), StoreError> {
        let key = session_key(session_id);
        let result_json =
            serde_json::to_string(result).map_err(|e| StoreError::Decode(e.to_string()))?;
        let last_activity_json = serde_json::to_string(&last_activity)
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        let mut conn = self.conn.clone();
        let ok: Option<bool> = self
            .with_timeout(
                self.append_result_script
                    .key(&key)
                    .arg(&result_json)
                    .arg(&last_activity_json)
                    .arg(self.ttl_secs)
                    .invoke_async(&mut conn),
            )
            .await?;

        if ok.unwrap_or(false) {
            Ok(())
        } else {
            Err(StoreError::NotFound)
        }
    }

    async fn apply_market_update(
        &self,
        session_id: &str,
        prices: &HashMap<String, f64>,
        last_activity: &str,
    ) -> Result<f64, StoreError> {
        let key = session_key(session_id);
        let prices_json =
            serde_json::to_string(prices).map_err(|e| StoreError::Decode(e.to_string()))?;
        let last_activity_json = serde_json::to_string(&last_activity)
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        let mut conn = self.conn.clone();
        let reply: Option<String> = self
            .with_timeout(
                self.apply_market_update_script
                    .key(&key)
                    .arg(&prices_json)
                    .arg(&last_activity_json)
                    .arg(self.ttl_secs)
                    .invoke_async(&mut conn),
            )
            .await?;

        let total_str = reply.ok_or(StoreError::NotFound)?;
        total_str
            .parse::<f64>()
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn list_sessions(&self) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut ids = Vec::new();

        loop {
            let (next_cursor, keys): (u64, Vec<String>) = self
                .with_timeout(async {
                    redis::cmd("SCAN")
                        .cursor_arg(cursor)
                        .arg("MATCH")
                        .arg("portfolio:*")
                        .arg("COUNT")
                        .arg(200)
                        .query_async(&mut conn)
                        .await
                })
                .await?;

            ids.extend(
                keys.into_iter()
                    .filter_map(|k| k.strip_prefix("portfolio:").map(str::to_string)),
            );

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        Ok(ids)
    }
}
