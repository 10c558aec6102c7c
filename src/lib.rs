//! # Warden
//!
//! Session lifecycle and rate-limiting guard for the platform's
//! authenticated surface, backed by a shared Redis store.
//!
//! What it provides:
//!
//! - **Rate limiting** - fixed-window counters for sensitive actions
//!   (login, password reset, email verification), consistent across all
//!   service instances
//! - **Dual session TTLs** - the store's sliding idle expiry combined
//!   with a fixed absolute age check enforced on every request
//! - **Revocation** - destroy every session a user owns after a security
//!   event, via the per-user session index or a budgeted legacy keyspace
//!   scan
//!
//! The CRUD/auth-flow layer consumes this crate through [`Warden`]: one
//! instance per process, store handle injected at construction, closed
//! explicitly during shutdown.
//!
//! ## Example
//!
//! ```rust,no_run
//! use warden::{Config, Purpose, Warden};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let warden = Warden::connect(Config::from_env()?).await?;
//!
//!     if !warden.rate_limiter().check(Purpose::Login, "user@example.com").await? {
//!         // reject with a rate-limit error, do not attempt the login
//!     }
//!
//!     // ... after a password change:
//!     let revoked = warden.sessions().revoke_user_sessions("user-id").await?;
//!     tracing::info!(revoked, "Revoked sessions after password change");
//!
//!     warden.close().await;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

pub mod config;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod rate_limit;
pub mod sessions;
pub mod store;

pub use config::Config;
pub use error::{WardenError, WardenResult};
pub use middleware::{enforce_session_ttl, SessionUser};
pub use rate_limit::{Purpose, RateLimiter};
pub use sessions::{SessionManager, SessionPayload, SessionStatus};
pub use store::{MemoryStore, RedisStore, Store};

/// Per-process guard: the rate limiter and session manager sharing one
/// store handle and one configuration.
pub struct Warden<S> {
    config: Arc<Config>,
    store: Arc<S>,
    rate_limiter: RateLimiter<S>,
    sessions: SessionManager<S>,
}

impl<S: Store> Warden<S> {
    pub fn new(store: Arc<S>, config: Config) -> Self {
        let config = Arc::new(config);
        Self {
            rate_limiter: RateLimiter::new(store.clone(), config.clone()),
            sessions: SessionManager::new(store.clone(), config.clone()),
            store,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn rate_limiter(&self) -> &RateLimiter<S> {
        &self.rate_limiter
    }

    pub fn sessions(&self) -> &SessionManager<S> {
        &self.sessions
    }

    /// Store connectivity check, for health endpoints
    pub async fn ping(&self) -> WardenResult<()> {
        self.store.ping().await
    }
}

impl Warden<RedisStore> {
    /// Connect to the store and build the per-process guard.
    pub async fn connect(config: Config) -> anyhow::Result<Self> {
        let redis_url_safe = if let Some(at_pos) = config.redis_url.find('@') {
            let protocol_end = config.redis_url.find("://").map(|p| p + 3).unwrap_or(0);
            format!(
                "{}***{}",
                &config.redis_url[..protocol_end],
                &config.redis_url[at_pos..]
            )
        } else {
            config.redis_url.clone()
        };
        tracing::info!("Connecting to session store at: {}", redis_url_safe);

        let store = RedisStore::connect(
            &config.redis_url,
            config.connect_timeout,
            config.close_timeout,
        )
        .await?;
        tracing::info!("Connected to session store");

        Ok(Self::new(Arc::new(store), config))
    }

    /// Explicit shutdown: graceful store disconnect with a forced
    /// fallback. Call this once during process teardown.
    pub async fn close(&self) {
        self.store.close().await;
    }
}
