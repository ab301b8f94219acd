use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dalal_core::domain::prediction::{GroundingSource, PredictionResponse};
use dalal_core::domain::request::{PredictionDuration, StockCategory, StockSector};
use dalal_core::llm::error::{PredictionError, USER_FACING_MESSAGE};
use dalal_core::llm::gemini::GeminiClient;
use dalal_core::llm::prompt::build_prediction_prompt;
use dalal_core::predict::Predictor;

#[derive(Debug, Parser)]
#[command(name = "dalal_cli")]
struct Args {
    /// Stock category: Growth or Penny.
    #[arg(long, default_value = "Growth")]
    category: String,

    /// Prediction horizon: "7 Days", "15 Days" or "1 Month" (short: 7d, 15d, 1m).
    #[arg(long, default_value = "1 Month")]
    duration: String,

    /// Sector filter (Banking, IT, Auto, Pharma, FMCG, Energy, Metal,
    /// Infra, Realty), or All.
    #[arg(long, default_value = "All")]
    sector: String,

    /// Print the assembled prompt and exit without calling the model.
    #[arg(long)]
    dry_run: bool,

    /// Print the raw prediction payload as JSON instead of the summary.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = dalal_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let category: StockCategory = args.category.parse()?;
    let duration: PredictionDuration = args.duration.parse()?;
    let sector: StockSector = args.sector.parse()?;

    if args.dry_run {
        println!("{}", build_prediction_prompt(category, duration, sector));
        return Ok(());
    }

    let client = GeminiClient::from_settings(&settings)?;
    let predictor = Predictor::new(Arc::new(client));

    tracing::info!(%category, %duration, %sector, "requesting predictions");

    match predictor.fetch_predictions(category, duration, sector).await {
        Ok((response, sources)) => {
            tracing::info!(
                stocks = response.stocks.len(),
                sources = sources.len(),
                "prediction run finished"
            );
            if args.json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print_summary(&response, &sources, category, sector);
            }
            Ok(())
        }
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            match err.downcast_ref::<PredictionError>() {
                Some(diag) => tracing::error!(error = %diag, "prediction run failed"),
                None => tracing::error!(error = %err, "prediction run failed"),
            }
            anyhow::bail!(USER_FACING_MESSAGE);
        }
    }
}

fn print_summary(
    response: &PredictionResponse,
    sources: &[GroundingSource],
    category: StockCategory,
    sector: StockSector,
) {
    let analysis = &response.analysis;
    println!(
        "Market: {} | Top sector: {}",
        analysis.market_sentiment, analysis.top_sector
    );
    println!("{}", analysis.overview);
    println!();

    println!("Top {category} picks ({sector}):");
    for (idx, stock) in response.stocks.iter().enumerate() {
        println!(
            "{:>2}. {} ({}) {} -> {} | upside {:.1}% | stop {} | risk {}",
            idx + 1,
            stock.symbol,
            stock.sector,
            stock.current_price,
            stock.target_price,
            stock.potential_upside,
            stock.stop_loss,
            stock.risk_level,
        );
        println!("    {}", stock.reasoning);
    }

    if !sources.is_empty() {
        println!();
        println!("Sources:");
        for source in sources {
            println!("  - {} ({})", source.title, source.url);
        }
    }
}

fn init_sentry(settings: &dalal_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
