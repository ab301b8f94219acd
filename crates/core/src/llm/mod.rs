pub mod error;
pub mod gemini;
pub mod json;
pub mod prompt;

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub prompt: String,
    pub enable_web_search: bool,
    /// Provider-specific reasoning budget; `None` uses the client default.
    pub reasoning_budget: Option<u32>,
    /// Overrides the client's configured model when set.
    pub model: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GenerateOutput {
    pub text: String,
    pub citations: Vec<Citation>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Citation {
    pub uri: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Provider {
    Gemini,
}

#[async_trait::async_trait]
pub trait GenerationClient: Send + Sync {
    fn provider(&self) -> Provider;

    async fn generate(&self, request: GenerateRequest) -> anyhow::Result<GenerateOutput>;
}
