use crate::auth::{AuthBackend, AuthFlow, GoogleSignIn, OtpSend, OtpVerify};
use crate::domain::prediction::{GroundingSource, PredictionResponse};
use crate::domain::request::{PredictionDuration, StockCategory, StockSector};
use crate::domain::user::User;
use crate::llm::error::{PredictionError, USER_FACING_MESSAGE};
use crate::predict::Predictor;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct PredictionResult {
    pub response: PredictionResponse,
    pub generated_at: DateTime<Utc>,
}

/// One user's view of the app: the sign-in flow, the request controls and
/// the latest prediction run. Async operations follow the same shape as
/// [`AuthFlow`]: a `begin_*` claims the session, the returned token runs
/// the round trip, a `finish_*` lands the outcome. A caller sharing the
/// session behind a lock holds it only for the begin and the finish.
pub struct Session {
    auth: AuthFlow,
    predictor: Predictor,
    user: Option<User>,
    result: Option<PredictionResult>,
    sources: Vec<GroundingSource>,
    loading: Arc<AtomicBool>,
    error: Option<String>,
    category: StockCategory,
    duration: PredictionDuration,
    sector: StockSector,
}

impl Session {
    pub fn new(backend: Arc<dyn AuthBackend>, predictor: Predictor) -> Self {
        Self {
            auth: AuthFlow::new(backend),
            predictor,
            user: None,
            result: None,
            sources: Vec::new(),
            loading: Arc::new(AtomicBool::new(false)),
            error: None,
            category: StockCategory::default(),
            duration: PredictionDuration::default(),
            sector: StockSector::default(),
        }
    }

    pub fn auth(&self) -> &AuthFlow {
        &self.auth
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn result(&self) -> Option<&PredictionResult> {
        self.result.as_ref()
    }

    pub fn sources(&self) -> &[GroundingSource] {
        &self.sources
    }

    pub fn loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn category(&self) -> StockCategory {
        self.category
    }

    pub fn duration(&self) -> PredictionDuration {
        self.duration
    }

    pub fn sector(&self) -> StockSector {
        self.sector
    }

    /// Claims the sign-in flow for one google round trip. `None` when
    /// already signed in or the flow is busy.
    pub fn begin_google(&mut self) -> Option<GoogleSignIn> {
        if self.user.is_some() {
            return None;
        }
        self.auth.begin_google()
    }

    pub fn finish_google(
        &mut self,
        call: GoogleSignIn,
        res: anyhow::Result<User>,
    ) -> anyhow::Result<bool> {
        drop(call);
        let user = res?;
        self.finish_login(user);
        Ok(true)
    }

    pub async fn login_with_google(&mut self) -> anyhow::Result<bool> {
        let Some(call) = self.begin_google() else {
            return Ok(false);
        };
        let res = call.run().await;
        self.finish_google(call, res)
    }

    pub fn choose_phone_login(&mut self) {
        self.auth.choose_phone();
    }

    pub fn auth_back(&mut self) {
        self.auth.back();
    }

    /// Claims the sign-in flow for one send-OTP round trip; the validation
    /// contract is [`AuthFlow::begin_submit_phone`]'s.
    pub fn begin_submit_phone(&mut self, raw: &str) -> Option<OtpSend> {
        if self.user.is_some() {
            return None;
        }
        self.auth.begin_submit_phone(raw)
    }

    pub fn finish_submit_phone(
        &mut self,
        call: OtpSend,
        res: anyhow::Result<()>,
    ) -> anyhow::Result<bool> {
        self.auth.finish_submit_phone(call, res)
    }

    pub async fn submit_phone(&mut self, raw: &str) -> anyhow::Result<bool> {
        let Some(call) = self.begin_submit_phone(raw) else {
            return Ok(false);
        };
        let res = call.run().await;
        self.finish_submit_phone(call, res)
    }

    /// Claims the sign-in flow for one OTP verification round trip.
    pub fn begin_submit_otp(&mut self, raw: &str) -> Option<OtpVerify> {
        if self.user.is_some() {
            return None;
        }
        self.auth.begin_submit_otp(raw)
    }

    pub fn finish_submit_otp(
        &mut self,
        call: OtpVerify,
        res: anyhow::Result<User>,
    ) -> anyhow::Result<bool> {
        drop(call);
        let user = res?;
        self.finish_login(user);
        Ok(true)
    }

    pub async fn submit_otp(&mut self, raw: &str) -> anyhow::Result<bool> {
        let Some(call) = self.begin_submit_otp(raw) else {
            return Ok(false);
        };
        let res = call.run().await;
        self.finish_submit_otp(call, res)
    }

    fn finish_login(&mut self, user: User) {
        tracing::info!(user_id = %user.id, provider = ?user.provider, "user signed in");
        self.user = Some(user);
        self.auth.reset();
    }

    pub fn choose_category(&mut self, category: StockCategory) {
        self.category = category;
    }

    pub fn choose_duration(&mut self, duration: PredictionDuration) {
        self.duration = duration;
    }

    pub fn choose_sector(&mut self, sector: StockSector) {
        self.sector = sector;
    }

    /// Claims the session for one prediction run: drops the previous
    /// outcome, snapshots the controls, and sets the loading flag. `None`
    /// means a run is already in flight and this one is dropped, not
    /// queued. The only `Err` is calling this without a signed-in user.
    pub fn begin_run(&mut self) -> anyhow::Result<Option<PredictionRun>> {
        anyhow::ensure!(self.user.is_some(), "generate requires a signed-in user");
        if self.loading.swap(true, Ordering::SeqCst) {
            return Ok(None);
        }

        let run_id = Uuid::new_v4();
        self.error = None;
        self.result = None;
        self.sources.clear();

        tracing::info!(
            %run_id,
            category = %self.category,
            duration = %self.duration,
            sector = %self.sector,
            "prediction run started"
        );

        Ok(Some(PredictionRun {
            run_id,
            category: self.category,
            duration: self.duration,
            sector: self.sector,
            predictor: self.predictor.clone(),
            _loading: LoadingRelease(self.loading.clone()),
        }))
    }

    /// Lands a finished run: stores the outcome, or collapses the failure
    /// to the one user-facing message with the diagnostics logged.
    pub fn finish_run(
        &mut self,
        run: PredictionRun,
        outcome: anyhow::Result<(PredictionResponse, Vec<GroundingSource>)>,
    ) {
        let run_id = run.run_id;
        drop(run);

        match outcome {
            Ok((response, sources)) => {
                tracing::info!(
                    %run_id,
                    stocks = response.stocks.len(),
                    sources = sources.len(),
                    "prediction run finished"
                );
                self.result = Some(PredictionResult {
                    response,
                    generated_at: Utc::now(),
                });
                self.sources = sources;
            }
            Err(err) => {
                match err.downcast_ref::<PredictionError>() {
                    Some(diag) => tracing::error!(%run_id, error = %diag, "prediction run failed"),
                    None => tracing::error!(%run_id, error = %err, "prediction run failed"),
                }
                self.error = Some(USER_FACING_MESSAGE.to_string());
            }
        }
    }

    /// Runs a prediction with the current controls. A failed run never
    /// bubbles diagnostics to the caller: it leaves [`Session::error`] set
    /// to the one user-facing message and logs the rest. The only `Err`
    /// here is calling this without a signed-in user.
    pub async fn generate(&mut self) -> anyhow::Result<()> {
        let Some(run) = self.begin_run()? else {
            return Ok(());
        };
        let outcome = run.fetch().await;
        self.finish_run(run, outcome);
        Ok(())
    }

    /// Same operation as [`Session::generate`]; the separate name mirrors
    /// the retry affordance shown next to a failed run.
    pub async fn retry(&mut self) -> anyhow::Result<()> {
        self.generate().await
    }

    /// Drops the current result so the controls come back. Sources and the
    /// signed-in user stay.
    pub fn new_analysis(&mut self) {
        self.result = None;
    }

    /// Signs out and drops the result and sources. A stale run error is
    /// left in place; the next run clears it.
    pub fn logout(&mut self) {
        if let Some(user) = self.user.take() {
            tracing::info!(user_id = %user.id, "user signed out");
        }
        self.result = None;
        self.sources.clear();
        self.auth.reset();
    }
}

/// A generation the session agreed to run: the controls were snapshotted
/// and the loading flag claimed. Run [`PredictionRun::fetch`] without
/// touching the session, then land it with [`Session::finish_run`].
/// Dropping it mid-flight releases the loading flag.
pub struct PredictionRun {
    run_id: Uuid,
    category: StockCategory,
    duration: PredictionDuration,
    sector: StockSector,
    predictor: Predictor,
    _loading: LoadingRelease,
}

impl PredictionRun {
    pub async fn fetch(&self) -> anyhow::Result<(PredictionResponse, Vec<GroundingSource>)> {
        self.predictor
            .fetch_predictions(self.category, self.duration, self.sector)
            .await
    }
}

/// Clears the shared loading flag when dropped.
struct LoadingRelease(Arc<AtomicBool>);

impl Drop for LoadingRelease {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
