// =============================================================================
// Process-wide shared state
// =============================================================================
//
// The handles every inbound connection needs: the typed repository, the
// Analysis Engine, the Session Registry, and the shared RNG. Built once in
// `bootstrap::init` and handed to the API router as Axum `State`.
// =============================================================================

use std::sync::Arc;

use crate::analysis::AnalysisEngine;
use crate::config::Config;
use crate::portfolio::PortfolioRepository;
use crate::rng::SharedRng;
use crate::session::SessionRegistry;
use crate::store::StateGateway;

pub struct AppState {
    pub config: Arc<Config>,
    pub repository: Arc<PortfolioRepository<StateGateway>>,
    pub engine: Arc<AnalysisEngine<StateGateway>>,
    pub registry: Arc<SessionRegistry<StateGateway>>,
    pub rng: Arc<SharedRng>,
}
