use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dalal_core::auth::mock::MockAuthBackend;
use dalal_core::auth::AuthStage;
use dalal_core::domain::prediction::{GroundingSource, PredictionResponse};
use dalal_core::domain::request::{PredictionDuration, StockCategory, StockSector};
use dalal_core::domain::user::User;
use dalal_core::llm::gemini::GeminiClient;
use dalal_core::predict::Predictor;
use dalal_core::session::Session;

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

    // A missing GEMINI_API_KEY aborts startup instead of failing the first
    // prediction request.
    let client = GeminiClient::from_settings(&settings)?;
    let predictor = Predictor::new(Arc::new(client));
    let session = Session::new(Arc::new(MockAuthBackend::new()), predictor);

    let state = AppState {
        session: Arc::new(Mutex::new(session)),
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/state", get(get_state))
        .route("/auth/google", post(auth_google))
        .route("/auth/phone", post(auth_choose_phone))
        .route("/auth/phone/number", post(auth_submit_phone))
        .route("/auth/phone/otp", post(auth_submit_otp))
        .route("/auth/back", post(auth_back))
        .route("/auth/logout", post(logout))
        .route("/controls", post(set_controls))
        .route("/predictions/generate", post(generate))
        .route("/predictions/retry", post(retry))
        .route("/predictions/new-analysis", post(new_analysis))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    session: Arc<Mutex<Session>>,
}

/// Everything a client needs to render: the auth flow, the controls, and
/// the latest run. Every intent endpoint responds with this same view.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StateView {
    auth_stage: AuthStage,
    auth_pending: bool,
    auth_error: Option<String>,
    user: Option<User>,
    category: StockCategory,
    duration: PredictionDuration,
    sector: StockSector,
    loading: bool,
    error: Option<String>,
    data: Option<PredictionResponse>,
    generated_at: Option<DateTime<Utc>>,
    sources: Vec<GroundingSource>,
}

fn state_view(session: &Session) -> StateView {
    StateView {
        auth_stage: session.auth().stage(),
        auth_pending: session.auth().pending(),
        auth_error: session.auth().error().map(str::to_string),
        user: session.user().cloned(),
        category: session.category(),
        duration: session.duration(),
        sector: session.sector(),
        loading: session.loading(),
        error: session.error().map(str::to_string),
        data: session.result().map(|r| r.response.clone()),
        generated_at: session.result().map(|r| r.generated_at),
        sources: session.sources().to_vec(),
    }
}

async fn get_state(State(state): State<AppState>) -> Json<StateView> {
    let session = state.session.lock().await;
    Json(state_view(&session))
}

async fn auth_google(State(state): State<AppState>) -> Result<Json<StateView>, StatusCode> {
    // The round trip runs between two short lock scopes, so /state stays
    // responsive and authPending is observable while it is in flight. A
    // request the flow does not accept gets the current state back.
    let call = { state.session.lock().await.begin_google() };
    let Some(call) = call else {
        return Ok(Json(state_view(&*state.session.lock().await)));
    };

    let res = call.run().await;

    let mut session = state.session.lock().await;
    session.finish_google(call, res).map_err(|e| {
        sentry_anyhow::capture_anyhow(&e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(state_view(&session)))
}

async fn auth_choose_phone(State(state): State<AppState>) -> Json<StateView> {
    let mut session = state.session.lock().await;
    session.choose_phone_login();
    Json(state_view(&session))
}

#[derive(Debug, Deserialize)]
struct PhonePayload {
    phone: String,
}

async fn auth_submit_phone(
    State(state): State<AppState>,
    Json(payload): Json<PhonePayload>,
) -> Result<Json<StateView>, StatusCode> {
    // Validation failures are not HTTP errors; they come back as authError
    // in the view.
    let call = {
        state
            .session
            .lock()
            .await
            .begin_submit_phone(&payload.phone)
    };
    let Some(call) = call else {
        return Ok(Json(state_view(&*state.session.lock().await)));
    };

    let res = call.run().await;

    let mut session = state.session.lock().await;
    session.finish_submit_phone(call, res).map_err(|e| {
        sentry_anyhow::capture_anyhow(&e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(state_view(&session)))
}

#[derive(Debug, Deserialize)]
struct OtpPayload {
    code: String,
}

async fn auth_submit_otp(
    State(state): State<AppState>,
    Json(payload): Json<OtpPayload>,
) -> Result<Json<StateView>, StatusCode> {
    let call = { state.session.lock().await.begin_submit_otp(&payload.code) };
    let Some(call) = call else {
        return Ok(Json(state_view(&*state.session.lock().await)));
    };

    let res = call.run().await;

    let mut session = state.session.lock().await;
    session.finish_submit_otp(call, res).map_err(|e| {
        sentry_anyhow::capture_anyhow(&e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(state_view(&session)))
}

async fn auth_back(State(state): State<AppState>) -> Json<StateView> {
    let mut session = state.session.lock().await;
    session.auth_back();
    Json(state_view(&session))
}

async fn logout(State(state): State<AppState>) -> Json<StateView> {
    let mut session = state.session.lock().await;
    session.logout();
    Json(state_view(&session))
}

#[derive(Debug, Deserialize)]
struct ControlsPayload {
    category: Option<String>,
    duration: Option<String>,
    sector: Option<String>,
}

async fn set_controls(
    State(state): State<AppState>,
    Json(payload): Json<ControlsPayload>,
) -> Result<Json<StateView>, StatusCode> {
    // Controls take the same relaxed spellings as the CLI flags ("7d",
    // "it", "penny"), not just the canonical labels.
    let category: Option<StockCategory> = parse_control(payload.category.as_deref())?;
    let duration: Option<PredictionDuration> = parse_control(payload.duration.as_deref())?;
    let sector: Option<StockSector> = parse_control(payload.sector.as_deref())?;

    let mut session = state.session.lock().await;
    if let Some(category) = category {
        session.choose_category(category);
    }
    if let Some(duration) = duration {
        session.choose_duration(duration);
    }
    if let Some(sector) = sector {
        session.choose_sector(sector);
    }
    Ok(Json(state_view(&session)))
}

fn parse_control<T: std::str::FromStr>(raw: Option<&str>) -> Result<Option<T>, StatusCode> {
    raw.map(T::from_str)
        .transpose()
        .map_err(|_| StatusCode::BAD_REQUEST)
}

async fn generate(State(state): State<AppState>) -> Result<Json<StateView>, StatusCode> {
    run_prediction(state).await
}

async fn retry(State(state): State<AppState>) -> Result<Json<StateView>, StatusCode> {
    run_prediction(state).await
}

/// Claims a run under the lock, fetches on a detached task so a dropped
/// request cannot abandon the flight, and responds with the landed state.
/// When a run is already in flight the current state comes straight back;
/// the competing run is dropped, not queued.
async fn run_prediction(state: AppState) -> Result<Json<StateView>, StatusCode> {
    let run = {
        let mut session = state.session.lock().await;
        session.begin_run().map_err(|err| {
            tracing::warn!(error = %err, "prediction run rejected");
            StatusCode::UNAUTHORIZED
        })?
    };

    if let Some(run) = run {
        let session = state.session.clone();
        let flight = tokio::spawn(async move {
            let outcome = run.fetch().await;
            session.lock().await.finish_run(run, outcome);
        });
        if flight.await.is_err() {
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    let session = state.session.lock().await;
    Ok(Json(state_view(&session)))
}

async fn new_analysis(State(state): State<AppState>) -> Json<StateView> {
    let mut session = state.session.lock().await;
    session.new_analysis();
    Json(state_view(&session))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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
