// =============================================================================
// Bootstrap — explicit process wiring
// =============================================================================
//
// Nothing in this crate connects to the document store, spawns a task, or
// touches the filesystem as a side effect of being imported. Everything
// happens here, once, in `init`, so startup failures are observable and
// ordered.
// =============================================================================

use std::sync::Arc;

use tracing::info;

use crate::analysis::AnalysisEngine;
use crate::config::Config;
use crate::error::StoreError;
use crate::market::MarketUpdater;
use crate::portfolio::PortfolioRepository;
use crate::rng::SharedRng;
use crate::session::SessionRegistry;
use crate::state::AppState;
use crate::store::StateGateway;

/// Connect to the document store, build the shared state, and spawn the
/// Market Updater. A failure here is fatal (§7 class 5 in design terms):
/// the caller should log and exit non-zero rather than serve traffic
/// against a half-initialized process.
pub async fn init(config: Config) -> Result<Arc<AppState>, StoreError> {
    let config = Arc::new(config);

    let gateway = Arc::new(StateGateway::new(&config).await?);
    let repository = Arc::new(PortfolioRepository::new(gateway));
    let engine = Arc::new(AnalysisEngine::new(repository.clone(), config.metric_delay_range));
    let registry = Arc::new(SessionRegistry::new());
    let rng = Arc::new(SharedRng::from_entropy());

    let updater = Arc::new(MarketUpdater::new(repository.clone(), rng.clone(), &config));
    updater.spawn();
    info!("market updater started");

    Ok(Arc::new(AppState {
        config,
        repository,
        engine,
        registry,
        rng,
    }))
}
