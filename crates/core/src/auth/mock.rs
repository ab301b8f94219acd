use crate::auth::AuthBackend;
use crate::domain::user::{AuthProvider, User};
use std::time::Duration;

const DEFAULT_LATENCY: Duration = Duration::from_millis(1500);

/// Stand-in for a real identity provider: waits a beat, then hands back a
/// canned profile. No credentials are checked and any 4-digit OTP verifies.
#[derive(Debug, Clone)]
pub struct MockAuthBackend {
    latency: Duration,
}

impl MockAuthBackend {
    pub fn new() -> Self {
        Self {
            latency: DEFAULT_LATENCY,
        }
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self { latency }
    }
}

impl Default for MockAuthBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl AuthBackend for MockAuthBackend {
    async fn google_sign_in(&self) -> anyhow::Result<User> {
        tokio::time::sleep(self.latency).await;
        Ok(User {
            id: "g_123".to_string(),
            name: "Demo User".to_string(),
            email: Some("demo@example.com".to_string()),
            phone: None,
            avatar: "https://ui-avatars.com/api/?name=Demo+User&background=22c55e&color=fff"
                .to_string(),
            provider: AuthProvider::Google,
        })
    }

    async fn send_otp(&self, _phone: &str) -> anyhow::Result<()> {
        tokio::time::sleep(self.latency).await;
        Ok(())
    }

    async fn verify_otp(&self, phone: &str, _code: &str) -> anyhow::Result<User> {
        tokio::time::sleep(self.latency).await;
        Ok(User {
            id: "p_123".to_string(),
            name: "Mobile User".to_string(),
            email: None,
            phone: Some(format!("+91 {phone}")),
            avatar: "https://ui-avatars.com/api/?name=Mobile+User&background=6366f1&color=fff"
                .to_string(),
            provider: AuthProvider::Phone,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn google_profile_matches_the_demo_identity() {
        let backend = MockAuthBackend::with_latency(Duration::ZERO);
        let user = backend.google_sign_in().await.unwrap();

        assert_eq!(user.id, "g_123");
        assert_eq!(user.name, "Demo User");
        assert_eq!(user.email.as_deref(), Some("demo@example.com"));
        assert!(user.phone.is_none());
        assert_eq!(user.provider, AuthProvider::Google);
    }

    #[tokio::test]
    async fn phone_profile_carries_the_formatted_number() {
        let backend = MockAuthBackend::with_latency(Duration::ZERO);
        let user = backend.verify_otp("9876543210", "0000").await.unwrap();

        assert_eq!(user.id, "p_123");
        assert_eq!(user.name, "Mobile User");
        assert_eq!(user.phone.as_deref(), Some("+91 9876543210"));
        assert!(user.email.is_none());
        assert_eq!(user.provider, AuthProvider::Phone);
    }
}
