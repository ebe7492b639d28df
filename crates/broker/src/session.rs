use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;

/// Broker session token shared by every REST call.
///
/// Replaced at runtime when the login flow produces a fresh session. While
/// empty, every authenticated call fails with `AuthenticationExpired`.
#[derive(Clone, Default)]
pub struct SessionToken {
    inner: Arc<RwLock<Option<SecretString>>>,
}

impl SessionToken {
    pub const ENV_VAR: &'static str = "TRAILSTOP_SESSION_TOKEN";

    #[must_use]
    pub fn new(token: Option<String>) -> Self {
        let token = token
            .filter(|t| !t.trim().is_empty())
            .map(SecretString::from);
        Self {
            inner: Arc::new(RwLock::new(token)),
        }
    }

    /// Reads the token from `TRAILSTOP_SESSION_TOKEN`, empty when unset.
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(std::env::var(Self::ENV_VAR).ok())
    }

    pub fn replace(&self, token: impl Into<String>) {
        let token: String = token.into();
        *self.inner.write() = Some(SecretString::from(token));
        tracing::info!("broker session token replaced");
    }

    pub fn clear(&self) {
        *self.inner.write() = None;
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        self.inner.read().is_some()
    }

    /// `Authorization` header value, if a session is present.
    #[must_use]
    pub(crate) fn bearer(&self) -> Option<String> {
        self.inner
            .read()
            .as_ref()
            .map(|t| format!("Bearer {}", t.expose_secret()))
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionToken")
            .field("set", &self.is_set())
            .finish()
    }
}
