use crate::domain::prediction::PredictionResponse;
use crate::llm::error::PredictionError;
use regex::Regex;
use std::sync::LazyLock;

/// The prompt asks for exactly this many stocks.
const EXPECTED_STOCKS: usize = 10;

static TAGGED_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json\n(.*?)\n```").expect("tagged fence pattern"));
static ANY_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(.*?)```").expect("fence pattern"));

/// Best-effort recovery of a JSON payload from a model reply.
///
/// Tiers, in order: a ```json fence, any fence, then the literal span from
/// the first `{` to the last `}`. The first tier that matches wins; an empty
/// capture from the winning tier is a failure, not a fallthrough. The brace
/// span is taken verbatim, with no balancing, so unrelated trailing braces
/// corrupt it and surface later as a decode failure.
pub fn extract_json(text: &str) -> Option<String> {
    for pattern in [&*TAGGED_FENCE, &*ANY_FENCE] {
        if let Some(captures) = pattern.captures(text) {
            let inner = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
            if inner.is_empty() {
                return None;
            }
            return Some(inner.to_string());
        }
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(text[start..=end].to_string())
}

/// Recovers the JSON payload from `text` and decodes it into the prediction
/// contract. Every failure comes back as a [`PredictionError::Extraction`]
/// carrying the reply for diagnostics.
pub fn parse_prediction_response(text: &str) -> anyhow::Result<PredictionResponse> {
    let Some(payload) = extract_json(text) else {
        return Err(PredictionError::Extraction {
            detail: "no JSON payload found".to_string(),
            raw_output: Some(text.to_string()),
        }
        .into());
    };

    let decoded = match serde_json::from_str::<PredictionResponse>(&payload) {
        Ok(decoded) => decoded,
        Err(err) => {
            return Err(PredictionError::Extraction {
                detail: format!("payload does not match the prediction contract: {err}"),
                raw_output: Some(payload),
            }
            .into())
        }
    };

    validate(decoded)
}

fn validate(mut response: PredictionResponse) -> anyhow::Result<PredictionResponse> {
    if response.stocks.len() != EXPECTED_STOCKS {
        tracing::warn!(
            got = response.stocks.len(),
            expected = EXPECTED_STOCKS,
            "model returned an unexpected number of stocks"
        );
    }

    for stock in &mut response.stocks {
        stock.symbol = stock.symbol.trim().to_string();
        stock.name = stock.name.trim().to_string();
        if stock.symbol.is_empty() || stock.name.is_empty() {
            return Err(PredictionError::Extraction {
                detail: "stock entry with empty symbol or name".to_string(),
                raw_output: None,
            }
            .into());
        }
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_response_value(stocks: usize) -> serde_json::Value {
        let stocks: Vec<_> = (1..=stocks)
            .map(|n| {
                json!({
                    "symbol": format!("STOCK{n}"),
                    "name": format!("Company {n}"),
                    "currentPrice": 100.0 + n as f64,
                    "targetPrice": 120.0 + n as f64,
                    "stopLoss": 90.0 + n as f64,
                    "potentialUpside": 15.5,
                    "sector": "Banking",
                    "reasoning": "Strong quarterly results and sector tailwinds",
                    "riskLevel": "Medium",
                })
            })
            .collect();

        json!({
            "analysis": {
                "overview": "Markets are consolidating after a strong rally.",
                "topSector": "Banking",
                "marketSentiment": "Bullish",
            },
            "stocks": stocks,
        })
    }

    #[test]
    fn extracts_tagged_fence_with_surrounding_prose() {
        let text = "Here is my analysis.\n```json\n{\"a\":1}\n```\nGood luck!";
        assert_eq!(extract_json(text), Some("{\"a\":1}".to_string()));
    }

    #[test]
    fn extracts_untagged_fence() {
        let text = "Sure!```{\"a\":1}```";
        assert_eq!(extract_json(text), Some("{\"a\":1}".to_string()));
    }

    #[test]
    fn tagged_fence_wins_over_untagged() {
        let text = "```\nnot this\n```\nand then\n```json\n{\"a\":1}\n```";
        assert_eq!(extract_json(text), Some("{\"a\":1}".to_string()));
    }

    #[test]
    fn falls_back_to_brace_span() {
        let text = "prefix {\"a\":1} suffix";
        assert_eq!(extract_json(text), Some("{\"a\":1}".to_string()));
    }

    #[test]
    fn brace_span_is_literal_first_to_last() {
        // No balancing: the stray closing brace widens the span.
        let text = "note {\"a\":{\"b\":2}} trailing }";
        assert_eq!(
            extract_json(text),
            Some("{\"a\":{\"b\":2}} trailing }".to_string())
        );
    }

    #[test]
    fn no_braces_yields_nothing() {
        assert_eq!(extract_json("all prose, no payload"), None);
    }

    #[test]
    fn unclosed_brace_yields_nothing() {
        assert_eq!(extract_json("starts { but never closes"), None);
    }

    #[test]
    fn reversed_braces_yield_nothing() {
        assert_eq!(extract_json("} backwards {"), None);
    }

    #[test]
    fn empty_fence_is_a_failure_not_a_fallthrough() {
        // The tagged fence matches with an empty body; the brace span below
        // it must not be consulted.
        let text = "```json\n\n``` ignore this {\"a\":1}";
        assert_eq!(extract_json(text), None);
    }

    #[test]
    fn parse_round_trips_a_fenced_payload() {
        let value = sample_response_value(10);
        let text = format!(
            "Market looks good.\n```json\n{}\n```\nStay cautious.",
            serde_json::to_string_pretty(&value).unwrap()
        );

        let response = parse_prediction_response(&text).unwrap();
        assert_eq!(response.stocks.len(), 10);
        assert_eq!(response.stocks[0].symbol, "STOCK1");
        assert_eq!(serde_json::to_value(&response).unwrap(), value);
    }

    #[test]
    fn parse_accepts_bare_brace_span() {
        let text = sample_response_value(10).to_string();
        let response = parse_prediction_response(&text).unwrap();
        assert_eq!(response.analysis.top_sector, "Banking");
    }

    #[test]
    fn parse_tolerates_fewer_than_ten_stocks() {
        let text = sample_response_value(3).to_string();
        let response = parse_prediction_response(&text).unwrap();
        assert_eq!(response.stocks.len(), 3);
    }

    #[test]
    fn parse_trims_symbol_and_name() {
        let mut value = sample_response_value(10);
        value["stocks"][0]["symbol"] = json!("  TATAMOTORS  ");
        value["stocks"][0]["name"] = json!(" Tata Motors ");

        let response = parse_prediction_response(&value.to_string()).unwrap();
        assert_eq!(response.stocks[0].symbol, "TATAMOTORS");
        assert_eq!(response.stocks[0].name, "Tata Motors");
    }

    #[test]
    fn parse_rejects_blank_symbol() {
        let mut value = sample_response_value(10);
        value["stocks"][4]["symbol"] = json!("   ");

        let err = parse_prediction_response(&value.to_string()).unwrap_err();
        let diag = err.downcast_ref::<PredictionError>().unwrap();
        assert!(matches!(diag, PredictionError::Extraction { .. }));
    }

    #[test]
    fn parse_reports_missing_payload() {
        let err = parse_prediction_response("the model rambled with no JSON").unwrap_err();
        let diag = err.downcast_ref::<PredictionError>().unwrap();
        match diag {
            PredictionError::Extraction { detail, raw_output } => {
                assert_eq!(detail, "no JSON payload found");
                assert!(raw_output.as_deref().unwrap().contains("rambled"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn parse_reports_contract_mismatch_with_payload() {
        let text = "```json\n{\"analysis\":\"not an object\"}\n```";
        let err = parse_prediction_response(text).unwrap_err();
        let diag = err.downcast_ref::<PredictionError>().unwrap();
        match diag {
            PredictionError::Extraction { detail, raw_output } => {
                assert!(detail.contains("prediction contract"));
                assert_eq!(raw_output.as_deref(), Some("{\"analysis\":\"not an object\"}"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn corrupted_brace_span_surfaces_as_contract_mismatch() {
        let text = format!("{} trailing }}", sample_response_value(10));
        let err = parse_prediction_response(&text).unwrap_err();
        let diag = err.downcast_ref::<PredictionError>().unwrap();
        match diag {
            PredictionError::Extraction { detail, .. } => {
                assert!(detail.contains("prediction contract"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
