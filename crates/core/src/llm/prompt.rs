use crate::domain::request::{PredictionDuration, StockCategory, StockSector};

/// Assembles the analyst prompt for one prediction run. Pure templating:
/// the same request parameters always yield the same prompt.
pub fn build_prediction_prompt(
    category: StockCategory,
    duration: PredictionDuration,
    sector: StockSector,
) -> String {
    let duration_text = match duration {
        PredictionDuration::OneMonth => "upcoming month".to_string(),
        other => format!("upcoming {}", other.to_string().to_lowercase()),
    };

    let type_context = match category {
        StockCategory::Penny => {
            "Focus strictly on Indian Penny Stocks (Price generally < ₹50, Low Market Cap). \
             These must be high-volume movers with breakout potential. \
             NOTE: Penny stocks are high risk."
        }
        StockCategory::Growth => {
            "Focus on high-potential Equity stocks (Mid-cap to Large-cap) with strong \
             fundamentals and technical setups."
        }
    };

    let sector_context = match sector {
        StockSector::All => {
            "Analyze all major sectors to find the absolute best opportunities.".to_string()
        }
        named => format!(
            "Focus EXCLUSIVELY on stocks within the {named} sector. \
             Do not recommend stocks from other sectors."
        ),
    };

    // Short horizons chase breakouts; longer ones settle for steady upside.
    let return_expectation = match duration {
        PredictionDuration::SevenDays => {
            "Identify high-momentum breakout stocks that could yield 15% or maximum possible \
             short-term gains."
        }
        _ => "Identify stocks with the potential to generate at least 15% returns.",
    };

    let sector_label = match sector {
        StockSector::All => String::new(),
        named => format!("{named} "),
    };
    let category_label = match category {
        StockCategory::Penny => "Penny Stocks",
        StockCategory::Growth => "Stocks",
    };

    format!(
        "Act as a senior financial analyst for the Indian Stock Market (NSE/BSE).
I need a prediction for the Top 10 {sector_label}{category_label} for the {duration_text}.

{type_context}
{sector_context}
{return_expectation}

You MUST use Google Search to analyze:
1. Current market momentum, news, and volatility relevant to the {duration} timeframe.
2. Recent quarterly results (QoQ and YoY growth).
3. Technical indicators (RSI, Moving Averages, Volume Breakouts) specifically for a {duration} trade.
4. Institutional flows (FII/DII activity) and Operator activity (especially for penny stocks).

Output Criteria:
- Identify 10 distinct stocks.
- Calculate a realistic target price based on the timeframe.
- Provide a Stop Loss to manage risk (Crucial for penny stocks).
- Assign a Risk Level (High/Medium/Low).

Format Requirements:
You must return the result as a raw JSON object embedded in a markdown code block.
The JSON structure must match this interface:
{{
  \"analysis\": {{
    \"overview\": \"Brief 2-sentence summary of current Indian market conditions for the selected timeframe.\",
    \"topSector\": \"The most promising sector right now (or the selected sector if specific)\",
    \"marketSentiment\": \"Bullish\" | \"Bearish\" | \"Neutral\"
  }},
  \"stocks\": [
    {{
      \"symbol\": \"Ticker Symbol (e.g., TATAMOTORS)\",
      \"name\": \"Full Company Name\",
      \"currentPrice\": Number (Current market price in INR),
      \"targetPrice\": Number (Projected price in {duration}),
      \"stopLoss\": Number,
      \"potentialUpside\": Number (Percentage value, e.g., 15.5),
      \"sector\": \"Sector Name\",
      \"reasoning\": \"Concise technical or fundamental reason for the pick (max 20 words)\",
      \"riskLevel\": \"High\" | \"Medium\" | \"Low\"
    }}
  ]
}}"
    )
}
