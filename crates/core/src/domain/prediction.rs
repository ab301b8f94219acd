use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketSentiment {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockPrediction {
    pub symbol: String,
    pub name: String,
    pub current_price: f64,
    pub target_price: f64,
    pub stop_loss: f64,
    /// Percentage value, e.g. 15.5.
    pub potential_upside: f64,
    pub sector: String,
    pub reasoning: String,
    pub risk_level: RiskLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketAnalysis {
    pub overview: String,
    pub top_sector: String,
    pub market_sentiment: MarketSentiment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub analysis: MarketAnalysis,
    pub stocks: Vec<StockPrediction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingSource {
    pub url: String,
    pub title: String,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RiskLevel::High => "High",
            RiskLevel::Medium => "Medium",
            RiskLevel::Low => "Low",
        };
        f.write_str(label)
    }
}

impl fmt::Display for MarketSentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MarketSentiment::Bullish => "Bullish",
            MarketSentiment::Bearish => "Bearish",
            MarketSentiment::Neutral => "Neutral",
        };
        f.write_str(label)
    }
}
