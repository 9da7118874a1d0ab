// =============================================================================
// Error Taxonomy — Portfolio Analysis Backend
// =============================================================================
//
// Five classes, matching the failure-handling design:
//   1. Protocol errors   — malformed/unknown inbound messages. Surfaced to the
//      client as an `error` frame; the connection stays open.
//   2. Store errors       — document-store not-found / transport failures.
//      Analysis-path occurrences abort the current run; Market Updater
//      occurrences are logged and the session is skipped until next tick.
//   3. Cancellation        — not an error. Modeled as `RunOutcome::Cancelled`
//      in `analysis::engine`, never as a `Result::Err`.
//   4. Kernel panics       — caught at the `JoinHandle` boundary, logged, and
//      turned into a protocol `error` frame for that one metric.
//   5. Fatal startup       — a `StoreError` out of `bootstrap::init` (the
//      only failure mode at startup), logged and turned into a non-zero
//      exit by `main`.
// =============================================================================

use thiserror::Error;

/// Errors surfaced directly to a connected client as an `error` frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown action {0:?}")]
    UnknownAction(String),

    #[error("missing or invalid ticker: {0}")]
    InvalidTicker(String),

    #[error("malformed message: {0}")]
    Malformed(String),
}

/// Errors produced by the State Gateway / Portfolio Repository.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session not found")]
    NotFound,

    #[error("document store transport error: {0}")]
    Transport(#[from] redis::RedisError),

    #[error("document store call timed out")]
    Timeout,

    #[error("document store returned malformed data: {0}")]
    Decode(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }
}
