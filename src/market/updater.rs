// =============================================================================
// Market Updater — periodic total_value recomputation
// =============================================================================
//
// A single process-wide task, independent of any Session Controller: it
// mutates `total_value` only, never `current_analysis` or
// `analysis_results`, and never touches a snapshot already handed to a
// running Analysis Engine. A market tick that lands mid-run is therefore
// invisible to that run — the snapshot-consistency guarantee, bought at the
// cost of staleness bounded by analysis latency.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::Config;
use crate::portfolio::repository::PortfolioRepository;
use crate::rng::{random_walk, SharedRng};
use crate::store::Gateway;

const WALK_PCT: f64 = 0.02;

pub struct MarketUpdater<G: Gateway> {
    repository: Arc<PortfolioRepository<G>>,
    rng: Arc<SharedRng>,
    default_base_price: f64,
    base_prices: HashMap<String, f64>,
    last_prices: Mutex<HashMap<String, f64>>,
    interval: std::time::Duration,
}

impl<G: Gateway + 'static> MarketUpdater<G> {
    pub fn new(repository: Arc<PortfolioRepository<G>>, rng: Arc<SharedRng>, config: &Config) -> Self {
        Self {
            repository,
            rng,
            default_base_price: config.default_base_price,
            base_prices: config.base_prices.clone(),
            last_prices: Mutex::new(HashMap::new()),
            interval: std::time::Duration::from_secs(config.market_update_interval_secs),
        }
    }

    /// Spawn the periodic loop. The returned handle runs until the process
    /// exits; there is no external shutdown signal for it beyond process
    /// teardown (it holds no per-session resources to release).
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                ticker.tick().await;
                self.tick().await;
            }
        })
    }

    async fn tick(&self) {
        let session_ids = match self.repository.list_sessions().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "market updater: failed to list sessions, skipping this tick");
                return;
            }
        };

        for session_id in session_ids {
            if let Err(e) = self.update_one(&session_id).await {
                warn!(session_id = %session_id, error = %e, "market updater: skipping session for this tick");
            }
        }
    }

    async fn update_one(&self, session_id: &str) -> Result<(), crate::error::StoreError> {
        let doc = self.repository.read(session_id).await?;
        if doc.holdings.is_empty() {
            return Ok(());
        }

        let mut prices = HashMap::with_capacity(doc.holdings.len());
        {
            let mut last_prices = self.last_prices.lock();
            for ticker in doc.holdings.keys() {
                let base = self
                    .base_prices
                    .get(ticker)
                    .copied()
                    .unwrap_or(self.default_base_price);
                let previous = *last_prices.get(ticker).unwrap_or(&base);
                let next = random_walk(previous, WALK_PCT, &self.rng);
                last_prices.insert(ticker.clone(), next);
                prices.insert(ticker.clone(), next);
            }
        }

        let total = self.repository.apply_market_update(session_id, &prices).await?;
        debug!(session_id = %session_id, total_value = total, "market update applied");
        Ok(())
    }
}
