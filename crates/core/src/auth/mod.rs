pub mod mock;

use crate::domain::user::User;
use regex::Regex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

pub const INVALID_PHONE_MESSAGE: &str = "Please enter a valid 10-digit Indian mobile number";
pub const INVALID_OTP_MESSAGE: &str = "Please enter the 4-digit OTP";

static INDIAN_MOBILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[6-9]\d{9}$").expect("mobile number pattern"));

/// Where the sign-in flow currently is. Success is not a stage: the
/// resulting [`User`] is handed upward and the flow resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthStage {
    Selection,
    Phone,
    Otp,
}

#[async_trait::async_trait]
pub trait AuthBackend: Send + Sync {
    async fn google_sign_in(&self) -> anyhow::Result<User>;
    async fn send_otp(&self, phone: &str) -> anyhow::Result<()>;
    async fn verify_otp(&self, phone: &str, code: &str) -> anyhow::Result<User>;
}

/// Keeps only ASCII digits and caps the length, the same shaping the phone
/// and OTP input fields apply while the user types.
pub fn normalize_digits(raw: &str, max_len: usize) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_digit())
        .take(max_len)
        .collect()
}

/// The sign-in state machine: selection -> phone -> otp, with one backend
/// round trip in flight at a time. Every async operation splits into a
/// `begin_*` that validates and claims the flow, a claim token that runs
/// the round trip, and a finish that lands the outcome, so a caller
/// sharing the flow behind a lock never holds it across the await.
pub struct AuthFlow {
    backend: Arc<dyn AuthBackend>,
    stage: AuthStage,
    phone: String,
    pending: Arc<AtomicBool>,
    error: Option<String>,
}

impl AuthFlow {
    pub fn new(backend: Arc<dyn AuthBackend>) -> Self {
        Self {
            backend,
            stage: AuthStage::Selection,
            phone: String::new(),
            pending: Arc::new(AtomicBool::new(false)),
            error: None,
        }
    }

    pub fn stage(&self) -> AuthStage {
        self.stage
    }

    pub fn pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// The validated number an OTP was sent to; empty before that point.
    pub fn phone(&self) -> &str {
        &self.phone
    }

    pub fn choose_phone(&mut self) {
        if self.pending() || self.stage != AuthStage::Selection {
            return;
        }
        self.stage = AuthStage::Phone;
    }

    /// One step back: Otp -> Phone, Phone -> Selection. A validation error
    /// stays up until the next submission replaces or clears it.
    pub fn back(&mut self) {
        if self.pending() {
            return;
        }
        match self.stage {
            AuthStage::Selection => {}
            AuthStage::Phone => self.stage = AuthStage::Selection,
            AuthStage::Otp => self.stage = AuthStage::Phone,
        }
    }

    /// Claims the flow for one google sign-in. `None` means the flow was
    /// not in a state to accept it (wrong stage, or an operation already
    /// in flight).
    pub fn begin_google(&mut self) -> Option<GoogleSignIn> {
        if self.pending() || self.stage != AuthStage::Selection {
            return None;
        }
        Some(GoogleSignIn {
            backend: self.backend.clone(),
            _pending: self.claim(),
        })
    }

    /// Validates the number and claims the flow for one send-OTP round
    /// trip. `None` with an error set is a validation failure; `None`
    /// without one means the request was not accepted (wrong stage, or an
    /// operation already in flight).
    pub fn begin_submit_phone(&mut self, raw: &str) -> Option<OtpSend> {
        if self.pending() || self.stage != AuthStage::Phone {
            return None;
        }
        self.error = None;

        let number = normalize_digits(raw, 10);
        if !INDIAN_MOBILE.is_match(&number) {
            self.error = Some(INVALID_PHONE_MESSAGE.to_string());
            return None;
        }

        Some(OtpSend {
            backend: self.backend.clone(),
            number,
            _pending: self.claim(),
        })
    }

    /// Lands a finished send-OTP call: on success the flow advances to the
    /// OTP stage for the validated number.
    pub fn finish_submit_phone(
        &mut self,
        call: OtpSend,
        res: anyhow::Result<()>,
    ) -> anyhow::Result<bool> {
        let OtpSend { number, .. } = call;
        res?;
        self.phone = number;
        self.stage = AuthStage::Otp;
        Ok(true)
    }

    /// Validates the code and claims the flow for one verification round
    /// trip. Same `None` contract as [`AuthFlow::begin_submit_phone`].
    pub fn begin_submit_otp(&mut self, raw: &str) -> Option<OtpVerify> {
        if self.pending() || self.stage != AuthStage::Otp {
            return None;
        }
        self.error = None;

        let code = normalize_digits(raw, 4);
        if code.len() != 4 {
            self.error = Some(INVALID_OTP_MESSAGE.to_string());
            return None;
        }

        Some(OtpVerify {
            backend: self.backend.clone(),
            phone: self.phone.clone(),
            code,
            _pending: self.claim(),
        })
    }

    /// Runs the google sign-in. `None` means the flow was not in a state to
    /// accept the request (wrong stage, or an operation already in flight).
    pub async fn login_with_google(&mut self) -> anyhow::Result<Option<User>> {
        let Some(call) = self.begin_google() else {
            return Ok(None);
        };
        let res = call.run().await;
        drop(call);
        Ok(Some(res?))
    }

    /// Validates the phone number and requests an OTP for it. `true` means
    /// the flow advanced to the OTP stage; `false` means it stayed put and
    /// [`AuthFlow::error`] says why (or an operation was already in flight).
    pub async fn submit_phone(&mut self, raw: &str) -> anyhow::Result<bool> {
        let Some(call) = self.begin_submit_phone(raw) else {
            return Ok(false);
        };
        let res = call.run().await;
        self.finish_submit_phone(call, res)
    }

    /// Validates the OTP and completes the phone sign-in. `None` without an
    /// error set means the request was not accepted at all.
    pub async fn submit_otp(&mut self, raw: &str) -> anyhow::Result<Option<User>> {
        let Some(call) = self.begin_submit_otp(raw) else {
            return Ok(None);
        };
        let res = call.run().await;
        drop(call);
        Ok(Some(res?))
    }

    /// Back to the selection screen with all in-progress input dropped.
    pub fn reset(&mut self) {
        self.stage = AuthStage::Selection;
        self.phone.clear();
        self.pending.store(false, Ordering::SeqCst);
        self.error = None;
    }

    fn claim(&self) -> PendingRelease {
        self.pending.store(true, Ordering::SeqCst);
        PendingRelease(self.pending.clone())
    }
}

/// One backend round trip the flow has agreed to run. Hold it across the
/// await, then hand it back with the outcome; dropping it mid-flight
/// releases the pending flag instead of wedging the flow.
pub struct GoogleSignIn {
    backend: Arc<dyn AuthBackend>,
    _pending: PendingRelease,
}

impl GoogleSignIn {
    pub async fn run(&self) -> anyhow::Result<User> {
        self.backend.google_sign_in().await
    }
}

pub struct OtpSend {
    backend: Arc<dyn AuthBackend>,
    number: String,
    _pending: PendingRelease,
}

impl OtpSend {
    pub async fn run(&self) -> anyhow::Result<()> {
        self.backend.send_otp(&self.number).await
    }
}

pub struct OtpVerify {
    backend: Arc<dyn AuthBackend>,
    phone: String,
    code: String,
    _pending: PendingRelease,
}

impl OtpVerify {
    pub async fn run(&self) -> anyhow::Result<User> {
        self.backend.verify_otp(&self.phone, &self.code).await
    }
}

/// Clears the shared pending flag when dropped.
struct PendingRelease(Arc<AtomicBool>);

impl Drop for PendingRelease {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
