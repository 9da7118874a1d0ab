// =============================================================================
// Session Registry
// =============================================================================
//
// A process-wide map of active session ids to their Session Controllers.
// Backed by `DashMap` so concurrent add/remove never blocks concurrent
// iteration (the Market Updater iterates a stable snapshot of session ids
// while client connections add and remove entries) — a plain
// `RwLock<HashMap>` would serialize iteration against every add/remove.
// =============================================================================

use std::sync::Arc;

use dashmap::DashMap;

use crate::store::Gateway;

pub struct SessionRegistry<G: Gateway> {
    sessions: DashMap<String, Arc<crate::session::controller::SessionController<G>>>,
}

impl<G: Gateway> SessionRegistry<G> {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    pub fn insert(&self, session_id: String, controller: Arc<crate::session::controller::SessionController<G>>) {
        self.sessions.insert(session_id, controller);
    }

    pub fn remove(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<crate::session::controller::SessionController<G>>> {
        self.sessions.get(session_id).map(|e| e.value().clone())
    }

    /// A stable snapshot of the active session ids, safe to iterate while
    /// other tasks concurrently insert or remove entries.
    pub fn active_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl<G: Gateway> Default for SessionRegistry<G> {
    fn default() -> Self {
        Self::new()
    }
}
