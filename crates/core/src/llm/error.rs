use crate::llm::Provider;
use serde_json::Value;
use std::fmt;

/// The one message surfaced to users when a prediction run fails, whatever
/// actually went wrong. The diagnostics below are for logs only.
pub const USER_FACING_MESSAGE: &str =
    "AI Model is busy or encountered an error parsing market data. Please try again.";

#[derive(Debug, Clone)]
pub enum PredictionError {
    /// The external generation call failed: transport, a non-success HTTP
    /// status, or a response envelope that could not be decoded.
    Generation {
        provider: Provider,
        stage: &'static str,
        detail: String,
        raw_response_json: Option<Value>,
    },
    /// The reply text carried no recoverable JSON payload, or the payload
    /// did not match the prediction contract.
    Extraction {
        detail: String,
        raw_output: Option<String>,
    },
}

impl fmt::Display for PredictionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredictionError::Generation {
                provider,
                stage,
                detail,
                ..
            } => write!(
                f,
                "generation failed (provider={provider:?}, stage={stage}): {detail}"
            ),
            PredictionError::Extraction { detail, .. } => {
                write!(f, "extraction failed: {detail}")
            }
        }
    }
}

impl std::error::Error for PredictionError {}
