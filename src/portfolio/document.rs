// =============================================================================
// Session Document Shape
// =============================================================================
//
// One document per session, stored at key `portfolio:{session_id}`. The
// shape here matches exactly what the Lua scripts in `store::scripts` read
// and write; `PortfolioDocument` round-trips losslessly through
// `serde_json`, which is how the State Gateway moves it in and out of Redis.
// =============================================================================

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One of the five metrics the Analysis Engine computes per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    PortfolioRisk,
    Concentration,
    Correlation,
    Momentum,
    AllocationScore,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::PortfolioRisk,
        Metric::Concentration,
        Metric::Correlation,
        Metric::Momentum,
        Metric::AllocationScore,
    ];
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Metric::PortfolioRisk => "portfolio_risk",
            Metric::Concentration => "concentration",
            Metric::Correlation => "correlation",
            Metric::Momentum => "momentum",
            Metric::AllocationScore => "allocation_score",
        };
        write!(f, "{s}")
    }
}

/// The `current_analysis` marker: set by `begin_analysis`, cleared only by
/// the next `begin_analysis` call (a cancelled run never clears it itself).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentAnalysis {
    pub ticker: String,
    pub started_at: String,
}

/// One completed metric result, append-only within `analysis_results`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub ticker: String,
    pub metric: Metric,
    pub value: f64,
    pub timestamp: String,
}

/// The full per-session document as stored in the document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioDocument {
    pub session_id: String,
    #[serde(default)]
    pub holdings: HashMap<String, i64>,
    #[serde(default)]
    pub total_value: f64,
    #[serde(default)]
    pub current_analysis: Option<CurrentAnalysis>,
    #[serde(default)]
    pub analysis_results: Vec<ResultRecord>,
    pub last_activity: String,
}

impl PortfolioDocument {
    /// Build a fresh document for a session that has never been seen before.
    pub fn new(session_id: impl Into<String>, now: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            holdings: HashMap::new(),
            total_value: 0.0,
            current_analysis: None,
            analysis_results: Vec::new(),
            last_activity: now.into(),
        }
    }
}

/// An immutable snapshot of a session document, taken atomically at the
/// start of an Analysis Engine run. All five metric kernels of that run see
/// exactly this value; it is never re-read from the store mid-run.
pub type Snapshot = PortfolioDocument;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_display_matches_wire_name() {
        assert_eq!(Metric::PortfolioRisk.to_string(), "portfolio_risk");
        assert_eq!(Metric::AllocationScore.to_string(), "allocation_score");
    }

    #[test]
    fn document_roundtrips_through_json() {
        let mut doc = PortfolioDocument::new("s-1-aaaa", "2026-01-01T00:00:00Z");
        doc.holdings.insert("AAPL".to_string(), 100);
        doc.analysis_results.push(ResultRecord {
            ticker: "AAPL".to_string(),
            metric: Metric::Momentum,
            value: 0.5,
            timestamp: "2026-01-01T00:00:01Z".to_string(),
        });

        let json = serde_json::to_string(&doc).unwrap();
        let back: PortfolioDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(doc, back);
    }

    #[test]
    fn missing_optional_fields_default() {
        let json = r#"{"session_id":"s-1","last_activity":"2026-01-01T00:00:00Z"}"#;
        let doc: PortfolioDocument = serde_json::from_str(json).unwrap();
        assert!(doc.holdings.is_empty());
        assert_eq!(doc.total_value, 0.0);
        assert!(doc.current_analysis.is_none());
        assert!(doc.analysis_results.is_empty());
    }
}
