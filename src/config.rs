use anyhow::Result;
use std::time::Duration;

// ============================================================================
// Configuration Constants
// ============================================================================

// Default session TTLs
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 3600;
const DEFAULT_ABSOLUTE_TTL_DAYS: u64 = 14;
const DEFAULT_INDEX_TTL_DAYS: u64 = 14;

// Default rate-limit policies (limit / window seconds)
const DEFAULT_LOGIN_RATE_LIMIT: u32 = 10;
const DEFAULT_LOGIN_RATE_WINDOW_SECS: u64 = 900;
const DEFAULT_PASSWORD_RESET_RATE_LIMIT: u32 = 3;
const DEFAULT_PASSWORD_RESET_RATE_WINDOW_SECS: u64 = 3600;
const DEFAULT_EMAIL_VERIFICATION_RATE_LIMIT: u32 = 3;
const DEFAULT_EMAIL_VERIFICATION_RATE_WINDOW_SECS: u64 = 3600;

// Legacy fallback scan defaults
const DEFAULT_SCAN_KEY_BUDGET: u64 = 5000;
const MIN_SCAN_KEY_BUDGET: u64 = 500;
const DEFAULT_SCAN_PAGE_SIZE: usize = 100;

// Store connection defaults
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CLOSE_TIMEOUT_SECS: u64 = 5;

const DEFAULT_COOKIE_NAME: &str = "sid";

// Time conversion constants
pub const SECONDS_PER_HOUR: u64 = 3600;
pub const SECONDS_PER_DAY: u64 = 86400;

// ============================================================================
// Configuration Structures
// ============================================================================

/// Store key prefixes.
///
/// These are part of the wire contract with the store and must be stable
/// across deploys: changing them orphans previously tracked sessions.
#[derive(Clone, Debug)]
pub struct KeyPrefixes {
    /// Prefix for session records: "sess:{session_id}"
    pub session: String,
    /// Prefix for per-user session index sets: "user_sessions:{user_id}"
    pub user_sessions: String,
    /// Prefix for session owner pointers: "session_user:{session_id}"
    pub session_user: String,
    /// Prefix for rate-limit counters: "ratelimit:{purpose}:{identity}"
    pub rate_limit: String,
}

impl Default for KeyPrefixes {
    fn default() -> Self {
        Self {
            session: "sess:".to_string(),
            user_sessions: "user_sessions:".to_string(),
            session_user: "session_user:".to_string(),
            rate_limit: "ratelimit:".to_string(),
        }
    }
}

/// A fixed-window rate-limit policy
#[derive(Clone, Copy, Debug)]
pub struct RatePolicy {
    pub limit: u32,
    pub window: Duration,
}

/// Per-purpose rate-limit policies for sensitive actions
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub login: RatePolicy,
    pub password_reset: RatePolicy,
    pub email_verification: RatePolicy,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            login: RatePolicy {
                limit: DEFAULT_LOGIN_RATE_LIMIT,
                window: Duration::from_secs(DEFAULT_LOGIN_RATE_WINDOW_SECS),
            },
            password_reset: RatePolicy {
                limit: DEFAULT_PASSWORD_RESET_RATE_LIMIT,
                window: Duration::from_secs(DEFAULT_PASSWORD_RESET_RATE_WINDOW_SECS),
            },
            email_verification: RatePolicy {
                limit: DEFAULT_EMAIL_VERIFICATION_RATE_LIMIT,
                window: Duration::from_secs(DEFAULT_EMAIL_VERIFICATION_RATE_WINDOW_SECS),
            },
        }
    }
}

/// Revocation fallback scan settings
///
/// The fallback scan only runs when `fallback_scan_enabled` is set and a
/// user's session index is empty (sessions created before indexing
/// existed). `scan_key_budget` bounds the number of keys a single
/// revocation may inspect; the scan stops early once it is exhausted,
/// which may under-revoke stale accounts.
#[derive(Clone, Debug)]
pub struct RevocationConfig {
    pub fallback_scan_enabled: bool,
    pub scan_key_budget: u64,
    pub scan_page_size: usize,
}

impl Default for RevocationConfig {
    fn default() -> Self {
        Self {
            fallback_scan_enabled: false,
            scan_key_budget: DEFAULT_SCAN_KEY_BUDGET,
            scan_page_size: DEFAULT_SCAN_PAGE_SIZE,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub redis_url: String,
    /// Sliding idle timeout, armed by the store on every session write
    pub idle_timeout: Duration,
    /// Fixed absolute timeout measured from session creation
    pub absolute_ttl: Duration,
    /// TTL for the session index and owner pointers, independent of
    /// individual session lifetimes
    pub index_ttl: Duration,
    pub cookie_name: String,
    pub prefixes: KeyPrefixes,
    pub rate_limits: RateLimitConfig,
    pub revocation: RevocationConfig,
    pub connect_timeout: Duration,
    pub close_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            absolute_ttl: Duration::from_secs(DEFAULT_ABSOLUTE_TTL_DAYS * SECONDS_PER_DAY),
            index_ttl: Duration::from_secs(DEFAULT_INDEX_TTL_DAYS * SECONDS_PER_DAY),
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            prefixes: KeyPrefixes::default(),
            rate_limits: RateLimitConfig::default(),
            revocation: RevocationConfig::default(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            close_timeout: Duration::from_secs(DEFAULT_CLOSE_TIMEOUT_SECS),
        }
    }
}

impl Config {
    /// Load configuration from the environment, once at process start.
    ///
    /// Every field is also plain data, so tests construct a `Config`
    /// directly to vary budgets and TTLs without process restarts.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let scan_key_budget = std::env::var("REVOCATION_SCAN_KEY_BUDGET")
            .ok()
            .and_then(|b| b.parse().ok())
            .unwrap_or(DEFAULT_SCAN_KEY_BUDGET);
        let scan_key_budget = if scan_key_budget < MIN_SCAN_KEY_BUDGET {
            tracing::warn!(
                requested = scan_key_budget,
                floor = MIN_SCAN_KEY_BUDGET,
                "REVOCATION_SCAN_KEY_BUDGET below floor, clamping"
            );
            MIN_SCAN_KEY_BUDGET
        } else {
            scan_key_budget
        };

        Ok(Self {
            redis_url: std::env::var("REDIS_URL")?,
            idle_timeout: Duration::from_secs(
                std::env::var("SESSION_IDLE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS),
            ),
            absolute_ttl: Duration::from_secs(
                std::env::var("SESSION_ABSOLUTE_TTL_DAYS")
                    .ok()
                    .and_then(|d| d.parse::<u64>().ok())
                    .unwrap_or(DEFAULT_ABSOLUTE_TTL_DAYS)
                    * SECONDS_PER_DAY,
            ),
            index_ttl: Duration::from_secs(
                std::env::var("SESSION_INDEX_TTL_DAYS")
                    .ok()
                    .and_then(|d| d.parse::<u64>().ok())
                    .unwrap_or(DEFAULT_INDEX_TTL_DAYS)
                    * SECONDS_PER_DAY,
            ),
            cookie_name: std::env::var("SESSION_COOKIE_NAME")
                .unwrap_or_else(|_| DEFAULT_COOKIE_NAME.to_string()),
            prefixes: KeyPrefixes::default(),
            rate_limits: RateLimitConfig {
                login: RatePolicy {
                    limit: std::env::var("LOGIN_RATE_LIMIT")
                        .ok()
                        .and_then(|l| l.parse().ok())
                        .unwrap_or(DEFAULT_LOGIN_RATE_LIMIT),
                    window: Duration::from_secs(
                        std::env::var("LOGIN_RATE_WINDOW_SECS")
                            .ok()
                            .and_then(|w| w.parse().ok())
                            .unwrap_or(DEFAULT_LOGIN_RATE_WINDOW_SECS),
                    ),
                },
                password_reset: RatePolicy {
                    limit: std::env::var("PASSWORD_RESET_RATE_LIMIT")
                        .ok()
                        .and_then(|l| l.parse().ok())
                        .unwrap_or(DEFAULT_PASSWORD_RESET_RATE_LIMIT),
                    window: Duration::from_secs(
                        std::env::var("PASSWORD_RESET_RATE_WINDOW_SECS")
                            .ok()
                            .and_then(|w| w.parse().ok())
                            .unwrap_or(DEFAULT_PASSWORD_RESET_RATE_WINDOW_SECS),
                    ),
                },
                email_verification: RatePolicy {
                    limit: std::env::var("EMAIL_VERIFICATION_RATE_LIMIT")
                        .ok()
                        .and_then(|l| l.parse().ok())
                        .unwrap_or(DEFAULT_EMAIL_VERIFICATION_RATE_LIMIT),
                    window: Duration::from_secs(
                        std::env::var("EMAIL_VERIFICATION_RATE_WINDOW_SECS")
                            .ok()
                            .and_then(|w| w.parse().ok())
                            .unwrap_or(DEFAULT_EMAIL_VERIFICATION_RATE_WINDOW_SECS),
                    ),
                },
            },
            revocation: RevocationConfig {
                fallback_scan_enabled: std::env::var("REVOCATION_FALLBACK_SCAN_ENABLED")
                    .unwrap_or_else(|_| "false".to_string())
                    .parse()
                    .unwrap_or(false),
                scan_key_budget,
                scan_page_size: DEFAULT_SCAN_PAGE_SIZE,
            },
            connect_timeout: Duration::from_secs(
                std::env::var("STORE_CONNECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            ),
            close_timeout: Duration::from_secs(
                std::env::var("STORE_CLOSE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_CLOSE_TIMEOUT_SECS),
            ),
        })
    }
}
