// ============================================================================
// Rate Limiter
// ============================================================================
//
// Fixed-window counters for sensitive actions, shared across all service
// instances through the store:
// - counter key: "ratelimit:{purpose}:{normalized-identity}"
// - the window expiry is armed once, on the first increment; it is never
//   re-extended within the window (true fixed window, not sliding)
//
// This is advisory throttling, not a hard security boundary: a burst
// straddling a window boundary can admit close to 2x the limit in a short
// span.
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, RatePolicy};
use crate::error::{WardenError, WardenResult};
use crate::metrics;
use crate::store::Store;

/// Sensitive actions subject to per-identity throttling
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Purpose {
    Login,
    PasswordReset,
    EmailVerification,
}

impl Purpose {
    pub fn tag(&self) -> &'static str {
        match self {
            Purpose::Login => "login",
            Purpose::PasswordReset => "password_reset",
            Purpose::EmailVerification => "email_verification",
        }
    }
}

pub struct RateLimiter<S> {
    store: Arc<S>,
    config: Arc<Config>,
}

impl<S: Store> RateLimiter<S> {
    pub fn new(store: Arc<S>, config: Arc<Config>) -> Self {
        Self { store, config }
    }

    /// Record an attempt against `key` and report whether it is within
    /// `limit` for the current window.
    ///
    /// The attempt is counted before the guarded action runs, so a failed
    /// login still consumes an attempt. The increment and the expiry check
    /// are two separate store calls: concurrent first requests in a fresh
    /// window may each observe a bare counter and re-arm the same expiry,
    /// which is idempotent.
    pub async fn is_allowed(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> WardenResult<bool> {
        let count = self.store.incr(key).await?;

        let ttl = self.store.pttl(key).await?;
        if ttl < 0 {
            self.store
                .pexpire(key, window.as_millis() as i64)
                .await?;
        }

        if count > i64::from(limit) {
            metrics::RATE_LIMIT_DENIED_TOTAL.inc();
            tracing::warn!(
                key = %key,
                count = count,
                limit = limit,
                "Rate limit exceeded"
            );
            return Ok(false);
        }
        Ok(true)
    }

    /// Attempts left in the current window, without consuming one.
    /// An absent counter means nothing has been used yet.
    pub async fn remaining_attempts(&self, key: &str, limit: u32) -> WardenResult<u32> {
        let count = self.store.get_i64(key).await?.unwrap_or(0);
        Ok(u32::try_from(i64::from(limit) - count).unwrap_or(0))
    }

    /// Record an attempt for a sensitive action, keyed by normalized
    /// identity. Callers must reject the request on `Ok(false)` and on
    /// `Err` (the store being unreachable fails closed).
    pub async fn check(&self, purpose: Purpose, identity: &str) -> WardenResult<bool> {
        let policy = self.policy(purpose);
        let key = self.rate_key(purpose, identity);
        self.is_allowed(&key, policy.limit, policy.window).await
    }

    /// Record a login attempt for `email`: 10 per 15 minutes by default.
    pub async fn check_login(&self, email: &str) -> WardenResult<bool> {
        self.check(Purpose::Login, email).await
    }

    /// Record a password-reset request for `email`: 3 per hour by default.
    pub async fn check_password_reset(&self, email: &str) -> WardenResult<bool> {
        self.check(Purpose::PasswordReset, email).await
    }

    /// Record an email-verification request for `email`: 3 per hour by default.
    pub async fn check_email_verification(&self, email: &str) -> WardenResult<bool> {
        self.check(Purpose::EmailVerification, email).await
    }

    /// Like [`Self::check`], but a denial becomes [`WardenError::RateLimited`],
    /// for handlers that reject with the structured 429 response.
    pub async fn enforce(&self, purpose: Purpose, identity: &str) -> WardenResult<()> {
        let policy = self.policy(purpose);
        if self.check(purpose, identity).await? {
            Ok(())
        } else {
            Err(WardenError::RateLimited {
                limit: policy.limit,
            })
        }
    }

    /// Attempts left for a sensitive action, without consuming one.
    pub async fn remaining(&self, purpose: Purpose, identity: &str) -> WardenResult<u32> {
        let policy = self.policy(purpose);
        let key = self.rate_key(purpose, identity);
        self.remaining_attempts(&key, policy.limit).await
    }

    fn policy(&self, purpose: Purpose) -> RatePolicy {
        match purpose {
            Purpose::Login => self.config.rate_limits.login,
            Purpose::PasswordReset => self.config.rate_limits.password_reset,
            Purpose::EmailVerification => self.config.rate_limits.email_verification,
        }
    }

    fn rate_key(&self, purpose: Purpose, identity: &str) -> String {
        format!(
            "{}{}:{}",
            self.config.prefixes.rate_limit,
            purpose.tag(),
            normalize_identity(identity)
        )
    }
}

/// Identities arrive as user input; the counter key must not depend on
/// case or stray whitespace.
fn normalize_identity(identity: &str) -> String {
    identity.trim().to_lowercase()
}
