use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::non_empty_env;

/// API key handed to the provider. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

/// Host-provided key capability. The session only asks it questions; where
/// the key lives is the host's business.
pub trait CredentialHost: Send + Sync {
    fn has_credential(&self) -> bool {
        self.credential().is_some()
    }

    /// Runs the host's key selection flow. Returns whether a key is now
    /// available.
    fn request_credential(&self) -> bool;

    fn credential(&self) -> Option<ApiKey>;

    /// Called after the remote service rejected the current key.
    fn invalidate(&self) {}
}

/// Reads `GEMINI_API_KEY`, then `GOOGLE_API_KEY`, on every lookup.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentials;

impl CredentialHost for EnvCredentials {
    fn request_credential(&self) -> bool {
        self.has_credential()
    }

    fn credential(&self) -> Option<ApiKey> {
        non_empty_env("GEMINI_API_KEY")
            .or_else(|| non_empty_env("GOOGLE_API_KEY"))
            .and_then(ApiKey::new)
    }
}

/// In-memory key slot, settable at runtime by the presentation layer.
#[derive(Debug, Clone, Default)]
pub struct SharedCredentials {
    slot: Arc<Mutex<Option<ApiKey>>>,
}

impl SharedCredentials {
    pub fn new(initial: Option<ApiKey>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(initial)),
        }
    }

    /// Seeds from `--api-key` when given, otherwise from the environment.
    pub fn from_flag_or_env(flag: Option<&str>) -> Self {
        let initial = flag
            .and_then(ApiKey::new)
            .or_else(|| EnvCredentials.credential());
        Self::new(initial)
    }

    pub fn set(&self, key: Option<ApiKey>) {
        *self.lock() = key;
    }

    fn lock(&self) -> MutexGuard<'_, Option<ApiKey>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CredentialHost for SharedCredentials {
    fn request_credential(&self) -> bool {
        if self.has_credential() {
            return true;
        }
        // Nothing stored yet; the environment may have been populated since.
        match EnvCredentials.credential() {
            Some(key) => {
                self.set(Some(key));
                true
            }
            None => false,
        }
    }

    fn credential(&self) -> Option<ApiKey> {
        self.lock().clone()
    }

    fn invalidate(&self) {
        self.set(None);
    }
}
