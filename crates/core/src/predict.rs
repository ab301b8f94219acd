use crate::domain::prediction::{GroundingSource, PredictionResponse};
use crate::domain::request::{PredictionDuration, StockCategory, StockSector};
use crate::llm::{json, prompt, Citation, GenerateRequest, GenerationClient};
use std::sync::Arc;

/// The end-to-end prediction pipeline: assemble the prompt, run a
/// search-grounded generation, recover the structured payload and the
/// sources the provider consulted.
#[derive(Clone)]
pub struct Predictor {
    client: Arc<dyn GenerationClient>,
}

impl Predictor {
    pub fn new(client: Arc<dyn GenerationClient>) -> Self {
        Self { client }
    }

    pub async fn fetch_predictions(
        &self,
        category: StockCategory,
        duration: PredictionDuration,
        sector: StockSector,
    ) -> anyhow::Result<(PredictionResponse, Vec<GroundingSource>)> {
        let prompt = prompt::build_prediction_prompt(category, duration, sector);

        let output = self
            .client
            .generate(GenerateRequest {
                prompt,
                enable_web_search: true,
                reasoning_budget: None,
                model: None,
            })
            .await?;

        let sources = output.citations.iter().map(grounding_source).collect();
        let response = json::parse_prediction_response(&output.text)?;

        Ok((response, sources))
    }
}

/// Citation titles fall back to the source hostname, or to the raw URI when
/// it does not parse as a URL.
fn grounding_source(citation: &Citation) -> GroundingSource {
    let title = citation
        .title
        .clone()
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| {
            reqwest::Url::parse(&citation.uri)
                .ok()
                .and_then(|url| url.host_str().map(str::to_string))
                .unwrap_or_else(|| citation.uri.clone())
        });

    GroundingSource {
        url: citation.uri.clone(),
        title,
    }
}
