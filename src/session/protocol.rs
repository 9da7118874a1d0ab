// =============================================================================
// On-wire message shapes
// =============================================================================
//
// Inbound messages are dynamically-typed on an `action` tag in the source
// system; here that's modeled as a tagged enum with a single real arm
// (`analyze`). Anything that doesn't deserialize into a known action lands
// in the protocol-error path at the call site — see `session::controller`.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::portfolio::document::Metric;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum InboundMessage {
    Analyze { ticker: String },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    AnalysisResult {
        ticker: String,
        metric: Metric,
        value: f64,
        timestamp: String,
    },
    Error {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyze_message_deserializes() {
        let json = r#"{"action":"analyze","ticker":"AAPL"}"#;
        let msg: InboundMessage = serde_json::from_str(json).unwrap();
        match msg {
            InboundMessage::Analyze { ticker } => assert_eq!(ticker, "AAPL"),
        }
    }

    #[test]
    fn unknown_action_fails_to_deserialize() {
        let json = r#"{"action":"nope"}"#;
        let result: Result<InboundMessage, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn analysis_result_serializes_with_expected_shape() {
        let msg = OutboundMessage::AnalysisResult {
            ticker: "AAPL".to_string(),
            metric: Metric::Momentum,
            value: 0.25,
            timestamp: "2026-01-01T00:00:00Z".to_string(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "analysis_result");
        assert_eq!(json["ticker"], "AAPL");
        assert_eq!(json["metric"], "momentum");
        assert_eq!(json["value"], 0.25);
    }

    #[test]
    fn error_message_serializes_with_expected_shape() {
        let msg = OutboundMessage::Error {
            message: "bad request".to_string(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "bad request");
    }
}
