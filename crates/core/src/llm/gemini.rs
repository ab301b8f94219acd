use crate::config::Settings;
use crate::llm::error::PredictionError;
use crate::llm::{Citation, GenerateOutput, GenerateRequest, GenerationClient, Provider};
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
// pro-preview for high reasoning plus search grounding.
const DEFAULT_MODEL: &str = "gemini-3-pro-preview";
const DEFAULT_THINKING_BUDGET: u32 = 1024;
const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    thinking_budget: u32,
}

impl GeminiClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_gemini_api_key()?.to_string();
        let base_url =
            std::env::var("GEMINI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let thinking_budget = std::env::var("GEMINI_THINKING_BUDGET")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_THINKING_BUDGET);

        let timeout_secs = std::env::var("GEMINI_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            http,
            api_key,
            base_url,
            model,
            thinking_budget,
        })
    }

    async fn generate_content(
        &self,
        model: &str,
        req: &GenerateContentRequest,
    ) -> anyhow::Result<GenerateContentResponse> {
        let mut headers = HeaderMap::new();
        headers.insert("x-goog-api-key", HeaderValue::from_str(&self.api_key)?);

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model
        );
        let res = self
            .http
            .post(url)
            .headers(headers)
            .json(req)
            .send()
            .await
            .map_err(|err| PredictionError::Generation {
                provider: Provider::Gemini,
                stage: "request",
                detail: err.to_string(),
                raw_response_json: None,
            })?;

        let status = res.status();
        let text = res.text().await.map_err(|err| PredictionError::Generation {
            provider: Provider::Gemini,
            stage: "read_body",
            detail: err.to_string(),
            raw_response_json: None,
        })?;
        if !status.is_success() {
            let raw_response_json = serde_json::from_str::<serde_json::Value>(&text).ok();
            return Err(PredictionError::Generation {
                provider: Provider::Gemini,
                stage: "http",
                detail: format!("status={status}"),
                raw_response_json,
            }
            .into());
        }

        serde_json::from_str::<GenerateContentResponse>(&text).map_err(|err| {
            PredictionError::Generation {
                provider: Provider::Gemini,
                stage: "decode",
                detail: err.to_string(),
                raw_response_json: serde_json::from_str(&text).ok(),
            }
            .into()
        })
    }

    fn response_text(res: &GenerateContentResponse) -> String {
        let Some(content) = res.candidates.first().and_then(|c| c.content.as_ref()) else {
            return String::new();
        };

        let mut out = String::new();
        for part in &content.parts {
            if let Some(text) = &part.text {
                out.push_str(text);
            }
        }
        out
    }

    fn response_citations(res: &GenerateContentResponse) -> Vec<Citation> {
        let Some(metadata) = res
            .candidates
            .first()
            .and_then(|c| c.grounding_metadata.as_ref())
        else {
            return Vec::new();
        };

        metadata
            .grounding_chunks
            .iter()
            .filter_map(|chunk| chunk.web.as_ref())
            .filter_map(|web| {
                let uri = web.uri.clone()?;
                if uri.is_empty() {
                    return None;
                }
                Some(Citation {
                    uri,
                    title: web.title.clone(),
                })
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl GenerationClient for GeminiClient {
    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    async fn generate(&self, request: GenerateRequest) -> anyhow::Result<GenerateOutput> {
        let model = request.model.clone().unwrap_or_else(|| self.model.clone());
        let body = GenerateContentRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart {
                    text: request.prompt,
                }],
            }],
            tools: request.enable_web_search.then(|| {
                vec![Tool {
                    google_search: GoogleSearch {},
                }]
            }),
            generation_config: Some(GenerationConfig {
                thinking_config: Some(ThinkingConfig {
                    thinking_budget: request.reasoning_budget.unwrap_or(self.thinking_budget),
                }),
            }),
        };

        let res = self.generate_content(&model, &body).await?;

        if let Some(reason) = res
            .candidates
            .first()
            .and_then(|c| c.finish_reason.as_deref())
        {
            if reason != "STOP" {
                tracing::warn!(
                    finish_reason = reason,
                    %model,
                    "Gemini candidate finished abnormally"
                );
            }
        }

        Ok(GenerateOutput {
            text: Self::response_text(&res),
            citations: Self::response_citations(&res),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<RequestContent>,

    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Clone, Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Debug, Clone, Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Debug, Clone, Serialize)]
struct Tool {
    google_search: GoogleSearch,
}

#[derive(Debug, Clone, Serialize)]
struct GoogleSearch {}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_config: Option<ThinkingConfig>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseCandidate {
    #[serde(default)]
    content: Option<ResponseContent>,
    #[serde(default)]
    grounding_metadata: Option<GroundingMetadata>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Clone, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Clone, Deserialize)]
struct GroundingChunk {
    #[serde(default)]
    web: Option<WebChunk>,
}

#[derive(Debug, Clone, Deserialize)]
struct WebChunk {
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_body_matches_the_wire_shape() {
        let body = GenerateContentRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart {
                    text: "analyze the market".to_string(),
                }],
            }],
            tools: Some(vec![Tool {
                google_search: GoogleSearch {},
            }]),
            generation_config: Some(GenerationConfig {
                thinking_config: Some(ThinkingConfig {
                    thinking_budget: 1024,
                }),
            }),
        };

        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["contents"][0]["parts"][0]["text"], "analyze the market");
        assert_eq!(value["tools"][0]["google_search"], json!({}));
        assert_eq!(
            value["generationConfig"]["thinkingConfig"]["thinkingBudget"],
            1024
        );
    }

    #[test]
    fn request_body_omits_tools_when_search_is_off() {
        let body = GenerateContentRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart {
                    text: "hello".to_string(),
                }],
            }],
            tools: None,
            generation_config: None,
        };

        let value = serde_json::to_value(&body).unwrap();
        assert!(value.get("tools").is_none());
        assert!(value.get("generationConfig").is_none());
    }

    #[test]
    fn response_text_concatenates_candidate_parts() {
        let raw = r#"{
            "candidates": [
                {
                    "content": {
                        "parts": [
                            {"text": "Part one. "},
                            {"thoughtSignature": "opaque"},
                            {"text": "Part two."}
                        ],
                        "role": "model"
                    },
                    "finishReason": "STOP"
                }
            ],
            "modelVersion": "gemini-3-pro-preview"
        }"#;

        let res: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(GeminiClient::response_text(&res), "Part one. Part two.");
        assert!(GeminiClient::response_citations(&res).is_empty());
    }

    #[test]
    fn response_citations_keep_only_web_chunks_with_a_uri() {
        let raw = r#"{
            "candidates": [
                {
                    "content": {"parts": [{"text": "ok"}]},
                    "groundingMetadata": {
                        "groundingChunks": [
                            {"web": {"uri": "https://example.com/a", "title": "Example A"}},
                            {"web": {"uri": "https://example.com/b"}},
                            {"retrievedContext": {"uri": "ignored"}},
                            {"web": {"uri": "", "title": "Empty"}}
                        ]
                    }
                }
            ]
        }"#;

        let res: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        let citations = GeminiClient::response_citations(&res);
        assert_eq!(
            citations,
            vec![
                Citation {
                    uri: "https://example.com/a".to_string(),
                    title: Some("Example A".to_string()),
                },
                Citation {
                    uri: "https://example.com/b".to_string(),
                    title: None,
                },
            ]
        );
    }

    #[test]
    fn empty_response_yields_empty_output() {
        let res: GenerateContentResponse = serde_json::from_str(r#"{"candidates": []}"#).unwrap();
        assert_eq!(GeminiClient::response_text(&res), "");
        assert!(GeminiClient::response_citations(&res).is_empty());
    }
}
